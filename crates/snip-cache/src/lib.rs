//! Cache-tier backends: resolution caches, collision filters and locks.
//!
//! Everything here is an optimization or a coordination aid. The durable
//! store stays the source of truth, so callers treat every error from this
//! crate as a degraded path rather than a failed request.

pub mod bloom_filter;
pub mod layered;
pub mod local_lock;
pub mod moka;
pub mod redis;
pub mod redis_filter;
pub mod redis_lock;

pub use bloom_filter::{BloomCollisionFilter, BloomFilterConfig};
pub use layered::LayeredCache;
pub use local_lock::LocalLock;
pub use moka::{MokaCacheConfig, MokaUrlCache};
pub use redis::RedisUrlCache;
pub use redis_filter::RedisBloomFilter;
pub use redis_lock::{RedisLock, RedisLockConfig};

pub(crate) fn map_redis_error(operation: &str, err: ::redis::RedisError) -> snip_core::CacheError {
    use snip_core::CacheError;

    let message = format!("{operation}: {err}");
    if err.is_timeout() || message.to_ascii_lowercase().contains("timed out") {
        CacheError::Timeout(message)
    } else if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
        CacheError::Unavailable(message)
    } else {
        CacheError::Operation(message)
    }
}
