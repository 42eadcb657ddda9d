//! Core types and traits for the snip URL shortener.
//!
//! This crate holds the shared vocabulary (short codes, records, cache
//! entries) and the seams every backend plugs into: the resolution cache,
//! the collision filter, the distributed lock and the durable store.

pub mod base62;
pub mod cache;
pub mod error;
pub mod filter;
pub mod lock;
pub mod repository;
pub mod shortcode;

pub use base62::ShortCodeBase62;
pub use cache::{CacheEntry, UrlCache};
pub use error::{CacheError, CoreError, LockError, StorageError};
pub use filter::CollisionFilter;
pub use lock::{DistributedLock, LockLease};
pub use repository::{
    AccessLog, AccessLogRepository, ReadRepository, Repository, ShortUrlRecord, Visit,
};
pub use shortcode::ShortCode;
