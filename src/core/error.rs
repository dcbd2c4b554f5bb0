use thiserror::Error;

use crate::storage::StorageError;

/// Centralized error types for the application
///
/// All errors in the application are converted to this enum for consistent error handling.
/// Uses `thiserror` for automatic error conversion and display formatting.
#[derive(Error, Debug)]
pub enum AppError {
    /// Storage-layer errors (connectivity, failed statements)
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Telegram API errors
    #[error("Telegram error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    /// Configuration errors (missing or malformed environment variables)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_converts_via_question_mark() {
        fn fails() -> AppResult<()> {
            Err(StorageError::Connectivity(sqlx::Error::PoolClosed))?
        }

        let err = fails().unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert!(err.to_string().starts_with("Storage error"));
    }

    #[test]
    fn test_io_error_converts_via_question_mark() {
        fn fails() -> AppResult<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no log file"))?
        }

        let err = fails().unwrap_err();
        assert!(matches!(err, AppError::Io(_)));
    }
}
