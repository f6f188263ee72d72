use thiserror::Error;

use super::{accounting_error::AccountingError, repository_error::RepositoryError};

/// Failure isolated to one symbol's replay; other symbols carry on.
#[derive(Error, Debug)]
pub enum RecomputeError {
    #[error("Failed to load trade history of {symbol}: {source}")]
    Load {
        symbol: String,
        #[source]
        source: RepositoryError,
    },

    #[error("Failed to replay {symbol}: {source}")]
    Arithmetic {
        symbol: String,
        #[source]
        source: AccountingError,
    },

    #[error("Failed to store recomputed pnl of {symbol}: {source}")]
    Store {
        symbol: String,
        #[source]
        source: RepositoryError,
    },
}

impl RecomputeError {
    pub fn symbol(&self) -> &str {
        match self {
            RecomputeError::Load { symbol, .. }
            | RecomputeError::Arithmetic { symbol, .. }
            | RecomputeError::Store { symbol, .. } => symbol,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            RecomputeError::Arithmetic { source, .. } => source.user_message(),
            _ => format!("Profit and loss for {} could not be refreshed", self.symbol()),
        }
    }
}
