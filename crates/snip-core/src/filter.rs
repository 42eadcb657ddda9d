use crate::error::CacheError;
use crate::shortcode::ShortCode;
use async_trait::async_trait;

pub type Result<T> = std::result::Result<T, CacheError>;

/// An approximate, append-only set of every code ever issued.
///
/// `might_contain` may report codes that were never added (false positives)
/// but must report every code that was added. There is no removal.
#[async_trait]
pub trait CollisionFilter: Send + Sync + 'static {
    async fn might_contain(&self, code: &ShortCode) -> Result<bool>;

    /// Adds a code. Adding the same code twice is a no-op.
    async fn add(&self, code: &ShortCode) -> Result<()>;
}
