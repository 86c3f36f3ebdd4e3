use std::error::Error;
use thiserror::Error;

/// Result alias for word source operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by word sources regardless of the backing corpus.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing corpus could not be reached.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// What was being attempted.
        message: String,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The corpus holds no words at all.
    #[error("word corpus is empty")]
    Empty,
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}
