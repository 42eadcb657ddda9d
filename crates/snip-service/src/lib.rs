//! Short URL creation and resolution on top of the cache tier and the
//! durable store.

pub mod config;
pub mod counter;
pub mod error;
pub mod service;
pub mod ttl;

pub use config::{ClickAccounting, ServiceConfig};
pub use counter::{counter_lock_key, CounterUpdater};
pub use error::{CounterError, ServiceError};
pub use service::{ExpirationPolicy, Resolution, ResolutionService, ShortenParams};
pub use ttl::CacheLifetime;
