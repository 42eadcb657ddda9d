use crate::error::CacheError;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, CacheError>;

/// A cached projection of a stored record.
///
/// When written, `ttl` is the lifetime the backend should apply. When read,
/// it is the remaining lifetime the backend reports. `None` means the entry
/// does not expire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub long_url: String,
    pub ttl: Option<Duration>,
}

impl CacheEntry {
    pub fn new(long_url: impl Into<String>, ttl: Option<Duration>) -> Self {
        Self {
            long_url: long_url.into(),
            ttl,
        }
    }
}

/// A read-through cache from short code to long URL.
///
/// Implementations can use Redis, in-memory caches, or other storage
/// backends. An entry must never outlive the `ttl` it was written with.
#[async_trait]
pub trait UrlCache: Send + Sync + 'static {
    /// Get the cached entry for a code.
    ///
    /// Returns `Ok(None)` if the key is not in the cache.
    async fn get_url(&self, code: &ShortCode) -> Result<Option<CacheEntry>>;

    /// Store an entry, overwriting whatever was cached for the code.
    async fn set_url(&self, code: &ShortCode, entry: &CacheEntry) -> Result<()>;

    /// Remove an entry. It is not an error if the key does not exist.
    async fn del(&self, code: &ShortCode) -> Result<()>;
}
