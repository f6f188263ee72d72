pub mod in_memory;
pub mod sqlite;

use chrono::NaiveDateTime;
use serde::Serialize;
use tally_model::{enums::Side, identifiers::TradeId, trade::Trade};

use crate::{accounting::cost_basis::PnlMap, model::repository_error::RepositoryError};

/// Watermark key of the exchange sync stream.
pub const LAST_SYNC_KEY: &str = "last_sync_timestamp";

pub trait TradeHandler {
    /// Insert one trade. `Ok(false)` means a trade with the same fingerprint is already
    /// stored; duplicates are never errors.
    fn insert_trade(&mut self, trade: Trade) -> Result<bool, RepositoryError>;

    /// Insert a batch as one unit of work. Duplicates, including repeats inside the batch,
    /// are counted as ignored.
    fn insert_trades(&mut self, trades: Vec<Trade>) -> Result<InsertOutcome, RepositoryError>;

    /// Trades matching `filter`, ascending by `(timestamp, sequence)`, limit applied last.
    fn query(&mut self, filter: &TradeFilter) -> Result<Vec<Trade>, RepositoryError>;

    /// Distinct normalised symbols, sorted.
    fn all_symbols(&mut self) -> Result<Vec<String>, RepositoryError>;

    fn trade_count(&mut self) -> Result<usize, RepositoryError>;

    /// Overwrite the cached pnl of `symbol`'s trades in one write. Returns the rows touched.
    fn set_pnl(&mut self, symbol: &str, pnl: &PnlMap) -> Result<usize, RepositoryError>;
}

pub trait WatermarkHandler {
    fn get_watermark(&mut self, key: &str) -> Result<Option<Watermark>, RepositoryError>;
    fn set_watermark(&mut self, key: &str, timestamp: NaiveDateTime) -> Result<(), RepositoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct InsertOutcome {
    pub inserted: usize,
    pub ignored: usize,
    pub inserted_ids: Vec<TradeId>,
}

impl InsertOutcome {
    pub fn record(&mut self, id: TradeId, inserted: bool) {
        if inserted {
            self.inserted += 1;
            self.inserted_ids.push(id);
        } else {
            self.ignored += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Watermark {
    pub key: String,
    pub timestamp: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TradeFilter {
    pub since: Option<NaiveDateTime>,
    pub symbol: Option<String>,
    pub side: Option<Side>,
    pub limit: Option<usize>,
}

impl TradeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn since(self, value: NaiveDateTime) -> Self {
        Self {
            since: Some(value),
            ..self
        }
    }

    pub fn symbol<S: Into<String>>(self, value: S) -> Self {
        Self {
            symbol: Some(value.into()),
            ..self
        }
    }

    pub fn side(self, value: Side) -> Self {
        Self {
            side: Some(value),
            ..self
        }
    }

    pub fn limit(self, value: usize) -> Self {
        Self {
            limit: Some(value),
            ..self
        }
    }

    pub fn matches(&self, trade: &Trade) -> bool {
        self.since.map_or(true, |since| trade.timestamp >= since)
            && self.symbol.as_deref().map_or(true, |symbol| trade.symbol == symbol)
            && self.side.map_or(true, |side| trade.side == side)
    }
}
