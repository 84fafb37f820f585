use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TesseraError {
    #[error("Database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Extraction unavailable: {0}")]
    ExtractionUnavailable(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("LLM rate limit exceeded, retry after {retry_after:?} seconds")]
    LlmRateLimit { retry_after: Option<u64> },
}

impl TesseraError {
    /// Whether the error came from the extraction side (capability or LLM transport)
    /// and should count toward the tagging retry budget.
    pub fn is_extraction_failure(&self) -> bool {
        matches!(
            self,
            TesseraError::ExtractionUnavailable(_)
                | TesseraError::Llm(_)
                | TesseraError::LlmUnavailable(_)
                | TesseraError::LlmRateLimit { .. }
                | TesseraError::Http(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TesseraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_range_message_names_both_dates() {
        let err = TesseraError::InvalidRange {
            start: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        };
        let msg = err.to_string();
        assert!(msg.contains("2024-05-02"));
        assert!(msg.contains("2024-05-01"));
    }

    #[test]
    fn test_extraction_failures_are_classified() {
        assert!(TesseraError::ExtractionUnavailable("timeout".into()).is_extraction_failure());
        assert!(TesseraError::LlmRateLimit { retry_after: None }.is_extraction_failure());
        assert!(!TesseraError::Validation("bad".into()).is_extraction_failure());
        assert!(!TesseraError::NotFound("x".into()).is_extraction_failure());
    }
}
