use thiserror::Error;

/// Application-wide error types for regcrawl.
#[derive(Error, Debug)]
pub enum AppError {
    /// The page driver failed (browser crash, CDP disconnect, script error).
    #[error("Driver error: {0}")]
    DriverError(String),

    /// A selector did not resolve to any element.
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Navigation to a URL failed.
    #[error("Navigation to {url} failed: {message}")]
    NavigationError { url: String, message: String },

    /// An operation did not finish within its budget.
    #[error("{operation} timed out after {seconds} seconds")]
    Timeout { operation: String, seconds: u64 },

    /// Reading or writing a ledger/progress/statistics file failed.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Ledger CSV encoding or decoding failed.
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Invalid crawl configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    pub fn timeout(operation: impl Into<String>, duration: std::time::Duration) -> Self {
        AppError::Timeout {
            operation: operation.into(),
            seconds: duration.as_secs(),
        }
    }

    /// Returns true if this error comes from the flaky UI layer and is worth retrying.
    ///
    /// Local persistence failures are never transient: retrying a full disk
    /// only hides the problem.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::DriverError(_)
                | AppError::ElementNotFound(_)
                | AppError::NavigationError { .. }
                | AppError::Timeout { .. }
        )
    }
}
