use async_trait::async_trait;
use chrono::NaiveDateTime;
use tally_model::{identifiers::DataSource, trade::RawTrade};

use crate::error::SourceError;

/// Supplier of raw trade records. Suppliers never validate: every row is handed to the
/// ingestion boundary as-is.
#[async_trait]
pub trait TradeSource {
    fn data_source(&self) -> DataSource;

    /// Records executed at or after `since` where the supplier can filter by time; a
    /// supplier that cannot returns everything it has. `Err` means nothing could be read.
    async fn fetch_trades(&self, since: Option<NaiveDateTime>) -> Result<FetchOutcome, SourceError>;
}

/// Records a supplier produced, plus the symbols it had to give up on.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub trades: Vec<RawTrade>,
    pub failures: Vec<FetchFailure>,
}

#[derive(Debug)]
pub struct FetchFailure {
    pub symbol: String,
    pub error: SourceError,
}

impl FetchOutcome {
    pub fn complete(trades: Vec<RawTrade>) -> Self {
        Self {
            trades,
            failures: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
