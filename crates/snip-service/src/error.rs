use snip_core::{CoreError, LockError, StorageError};
use snip_generator::GenerateError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("short code already exists: {0}")]
    Conflict(String),
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid expiration: {0}")]
    InvalidExpiration(String),
    #[error("expiration {0} is not in the future")]
    AlreadyExpired(String),
    #[error(transparent)]
    Generation(#[from] GenerateError),
    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl ServiceError {
    /// Whether repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Generation(e) => e.is_retryable(),
            ServiceError::Storage(StorageError::Unavailable(_) | StorageError::Timeout(_)) => true,
            _ => false,
        }
    }
}

impl From<CoreError> for ServiceError {
    fn from(value: CoreError) -> Self {
        match value {
            CoreError::InvalidShortCode(message) => Self::InvalidShortCode(message),
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::Conflict(code) => Self::Conflict(code),
            other => Self::Storage(other),
        }
    }
}

/// Failure to bump a click counter. Never surfaced to resolution callers.
#[derive(Debug, Clone, Error)]
pub enum CounterError {
    #[error("counter lock: {0}")]
    Lock(#[from] LockError),
    #[error("counter storage: {0}")]
    Storage(#[from] StorageError),
    #[error("counter update aborted: {0}")]
    Aborted(String),
}
