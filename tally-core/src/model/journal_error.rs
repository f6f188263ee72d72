use tally_model::error::ValidationError;
use thiserror::Error;

use super::{accounting_error::AccountingError, repository_error::RepositoryError};

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("Failed to build struct due to missing attributes: {0}")]
    BuilderIncomplete(&'static str),

    #[error("Failed to validate trade records: {0}")]
    Validation(#[from] ValidationError),

    #[error("Failed to interact with repository: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Failed to account for trades: {0}")]
    Accounting(#[from] AccountingError),
}

impl JournalError {
    pub fn user_message(&self) -> String {
        match self {
            JournalError::BuilderIncomplete(field) => format!("Journal is not configured: {field} missing"),
            JournalError::Validation(error) => error.user_message(),
            JournalError::Repository(error) => error.user_message(),
            JournalError::Accounting(error) => error.user_message(),
        }
    }
}
