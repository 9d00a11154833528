//! Error types for the crawler.
//!
//! Fetch errors carry a transient/permanent classification that drives the
//! retry loop; extraction errors are raised only for missing identity
//! fields; storage errors cover checkpoint and database failures.

use thiserror::Error;

/// Whether a fetch failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Retryable with backoff: timeouts, connection resets, 429, 5xx.
    Transient,
    /// Not retryable: other 4xx, exhausted retry budget.
    Permanent,
}

/// Errors from fetching a page.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned status {0}")]
    Status(u16),

    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    #[error("retry budget exhausted after {attempts} attempts (last status: {last_status:?})")]
    RetriesExhausted {
        attempts: u32,
        last_status: Option<u16>,
    },
}

impl FetchError {
    /// HTTP statuses that warrant a retry with backoff.
    pub fn is_retryable_status(status: u16) -> bool {
        matches!(status, 429 | 500 | 502 | 503 | 504)
    }

    /// Classify this failure for the retry loop and the error tally.
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Http(e) => {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    FetchErrorKind::Transient
                } else {
                    FetchErrorKind::Permanent
                }
            }
            FetchError::Status(code) => {
                if Self::is_retryable_status(*code) {
                    FetchErrorKind::Transient
                } else {
                    FetchErrorKind::Permanent
                }
            }
            FetchError::Timeout(_) => FetchErrorKind::Transient,
            FetchError::RetriesExhausted { .. } => FetchErrorKind::Permanent,
        }
    }

    /// The HTTP status attached to this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Http(e) => e.status().map(|s| s.as_u16()),
            FetchError::Status(code) => Some(*code),
            FetchError::RetriesExhausted { last_status, .. } => *last_status,
            _ => None,
        }
    }
}

/// Raised only when an identity field (name, URL) cannot be extracted.
/// Optional fields degrade to absent instead of erroring.
#[derive(Error, Debug)]
#[error("failed to extract '{field}': {reason}")]
pub struct ExtractionError {
    pub field: &'static str,
    pub reason: String,
}

impl ExtractionError {
    pub fn missing(field: &'static str) -> Self {
        Self {
            field,
            reason: "required field not found in page".to_string(),
        }
    }
}

/// Errors from the checkpoint store and the SQLite layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint schema version {found} is incompatible (expected {expected})")]
    SchemaVersion { found: u32, expected: u32 },

    #[error("checkpoint serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Top-level error type for crawl runs.
#[derive(Error, Debug)]
pub enum CrawlerError {
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        assert!(FetchError::is_retryable_status(429));
        assert!(FetchError::is_retryable_status(500));
        assert!(FetchError::is_retryable_status(503));
        assert!(!FetchError::is_retryable_status(404));
        assert!(!FetchError::is_retryable_status(403));
        assert!(!FetchError::is_retryable_status(200));
    }

    #[test]
    fn status_error_classification() {
        assert_eq!(FetchError::Status(503).kind(), FetchErrorKind::Transient);
        assert_eq!(FetchError::Status(429).kind(), FetchErrorKind::Transient);
        assert_eq!(FetchError::Status(404).kind(), FetchErrorKind::Permanent);
        assert_eq!(FetchError::Status(401).kind(), FetchErrorKind::Permanent);
    }

    #[test]
    fn exhausted_retries_are_permanent() {
        let err = FetchError::RetriesExhausted {
            attempts: 3,
            last_status: Some(503),
        };
        assert_eq!(err.kind(), FetchErrorKind::Permanent);
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn extraction_error_message() {
        let err = ExtractionError::missing("name");
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn schema_version_message() {
        let err = StorageError::SchemaVersion {
            found: 9,
            expected: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains('9'));
        assert!(msg.contains("incompatible"));
    }
}
