use tally_model::identifiers::TradeId;
use thiserror::Error;

/// Decimal arithmetic that left the representable range.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountingError {
    #[error("Decimal overflow while replaying trade {trade_id}")]
    ReplayOverflow { trade_id: TradeId },

    #[error("Decimal overflow while totalling {field}")]
    TotalOverflow { field: &'static str },
}

impl AccountingError {
    pub fn user_message(&self) -> String {
        match self {
            AccountingError::ReplayOverflow { trade_id } => {
                format!("Trade {trade_id} holds amounts too large to account for")
            }
            AccountingError::TotalOverflow { field } => format!("The {field} total is too large to report"),
        }
    }
}
