use reqwest::StatusCode;
use thiserror::Error;

/// All errors generated while pulling trade records from a supplier.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("workbook has no worksheet rows")]
    EmptyWorkbook,

    #[error("spreadsheet is missing required column: {0}")]
    MissingColumn(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("query encoding error: {0}")]
    UrlEncode(#[from] serde_urlencoded::ser::Error),

    #[error("JSON SerDe error: {error} while deserialising {payload}")]
    DeserialisingJson {
        error: serde_json::Error,
        payload: String,
    },

    #[error("exchange rejected request with {status}: {code} {message}")]
    Api {
        status: StatusCode,
        code: i64,
        message: String,
    },

    #[error("exchange credentials are not configured")]
    MissingCredentials,

    #[error("API secret cannot key HMAC-SHA256: {0}")]
    InvalidSecret(#[from] hmac::digest::InvalidLength),
}

impl SourceError {
    pub fn user_message(&self) -> String {
        match self {
            SourceError::Io(_) => "The trade file could not be opened".to_owned(),
            SourceError::Csv(_) | SourceError::Workbook(_) => {
                "The trade file is not a readable spreadsheet export".to_owned()
            }
            SourceError::EmptyWorkbook => "The trade file has no rows".to_owned(),
            SourceError::MissingColumn(column) => format!("The trade file has no {column} column"),
            SourceError::Http(_) | SourceError::UrlParse(_) | SourceError::UrlEncode(_) => {
                "The exchange could not be reached".to_owned()
            }
            SourceError::DeserialisingJson { .. } => "The exchange sent an unexpected response".to_owned(),
            SourceError::Api { message, .. } => format!("The exchange refused the request: {message}"),
            SourceError::MissingCredentials | SourceError::InvalidSecret(_) => {
                "Set an exchange API key and secret to sync".to_owned()
            }
        }
    }
}
