use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("field {field} is not a valid decimal: {value}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("field {field} must be greater than zero: {value}")]
    NonPositive { field: &'static str, value: String },

    #[error("field {field} must not be negative: {value}")]
    Negative { field: &'static str, value: String },

    #[error("invalid trade side: {0}")]
    InvalidSide(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("batch rejected: {failed} of {total} records failed validation (threshold {threshold})")]
    BatchQuality {
        failed: usize,
        total: usize,
        threshold: f64,
        samples: Vec<String>,
    },
}

impl ValidationError {
    /// Short summary suitable for display; `Display` carries the technical detail.
    pub fn user_message(&self) -> String {
        match self {
            ValidationError::MissingField(field) => format!("Record is missing {field}"),
            ValidationError::InvalidNumber { field, .. }
            | ValidationError::NonPositive { field, .. }
            | ValidationError::Negative { field, .. } => format!("Record has a bad {field} value"),
            ValidationError::InvalidSide(_) => "Record has an unknown side".to_owned(),
            ValidationError::InvalidTimestamp(_) => "Record has an unreadable time".to_owned(),
            ValidationError::InvalidSymbol(_) => "Record has an unreadable trading pair".to_owned(),
            ValidationError::BatchQuality { failed, total, .. } => {
                format!("Import rejected: {failed} of {total} rows are invalid")
            }
        }
    }

    pub fn field(&self) -> Option<&'static str> {
        match self {
            ValidationError::MissingField(field)
            | ValidationError::InvalidNumber { field, .. }
            | ValidationError::NonPositive { field, .. }
            | ValidationError::Negative { field, .. } => Some(*field),
            ValidationError::InvalidSide(_) => Some("side"),
            ValidationError::InvalidTimestamp(_) => Some("timestamp"),
            ValidationError::InvalidSymbol(_) => Some("symbol"),
            ValidationError::BatchQuality { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_field() {
        let error = ValidationError::InvalidNumber {
            field: "price",
            value: "abc".to_owned(),
        };
        assert_eq!(error.field(), Some("price"));
        assert!(error.to_string().contains("abc"));
        assert!(!error.user_message().contains("abc"));
    }

    #[test]
    fn test_batch_quality_has_no_field() {
        let error = ValidationError::BatchQuality {
            failed: 3,
            total: 4,
            threshold: 0.5,
            samples: vec![],
        };
        assert!(error.field().is_none());
        assert_eq!(error.user_message(), "Import rejected: 3 of 4 rows are invalid");
    }
}
