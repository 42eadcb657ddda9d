use crate::error::LockError;
use async_trait::async_trait;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, LockError>;

/// Proof of holding a named lock, handed back on release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    key: String,
    token: String,
}

impl LockLease {
    pub fn new(key: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            token: token.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

/// A named mutual-exclusion primitive shared by every instance that uses the
/// same backend.
#[async_trait]
pub trait DistributedLock: Send + Sync + 'static {
    /// Acquires `key`, waiting at most `wait`.
    ///
    /// Returns `LockError::Timeout` if the lock is still held by someone else
    /// when the wait runs out.
    async fn acquire(&self, key: &str, wait: Duration) -> Result<LockLease>;

    /// Releases a lease obtained from [`acquire`](DistributedLock::acquire).
    async fn release(&self, lease: LockLease) -> Result<()>;
}
