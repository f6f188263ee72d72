use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Failed to interact with sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode stored column {column}: {value}")]
    Decode { column: &'static str, value: String },
}

impl RepositoryError {
    pub fn user_message(&self) -> String {
        match self {
            RepositoryError::Sqlite(_) => "The trade database could not be read or written".to_owned(),
            RepositoryError::Io(_) => "The trade database location is not accessible".to_owned(),
            RepositoryError::Decode { .. } => "The trade database holds a corrupted record".to_owned(),
        }
    }
}
