use async_trait::async_trait;
use moka::future::Cache;
use moka::policy::Expiry;
use snip_core::{cache::Result, CacheEntry, ShortCode, UrlCache};
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use typed_builder::TypedBuilder;

#[derive(Debug, Clone)]
struct Slot {
    long_url: String,
    ttl: Option<Duration>,
    inserted_at: Instant,
}

impl Slot {
    /// `None` for entries without expiry, `Some(ZERO)` once the ttl has run out.
    fn remaining(&self) -> Option<Duration> {
        self.ttl
            .map(|ttl| ttl.saturating_sub(self.inserted_at.elapsed()))
    }
}

/// Expires every slot after the ttl it was written with.
struct SlotExpiry;

impl Expiry<String, Slot> for SlotExpiry {
    fn expire_after_create(&self, _key: &String, value: &Slot, _created_at: Instant) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Slot,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// An in-process resolution cache backed by Moka.
///
/// Each entry expires after its own ttl, so it can serve as the L1 in front
/// of Redis or as the only cache of a single-node deployment.
#[derive(Debug, Clone)]
pub struct MokaUrlCache {
    cache: Cache<String, Slot>,
}

impl MokaUrlCache {
    /// Creates a cache holding at most 10,000 entries.
    pub fn new() -> Self {
        MokaCacheConfig::default().into()
    }

    pub fn with_capacity(max_capacity: u64) -> Self {
        MokaCacheConfig::builder()
            .max_capacity(max_capacity)
            .build()
            .into()
    }

    pub fn builder() -> MokaCacheConfigBuilder {
        MokaCacheConfig::builder()
    }
}

impl Default for MokaUrlCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UrlCache for MokaUrlCache {
    async fn get_url(&self, code: &ShortCode) -> Result<Option<CacheEntry>> {
        trace!(code = %code, "Fetching URL from Moka cache");

        match self.cache.get(code.as_str()).await {
            Some(slot) => match slot.remaining() {
                Some(remaining) if remaining.is_zero() => {
                    trace!(code = %code, "Moka entry outlived its ttl, treating as miss");
                    Ok(None)
                }
                ttl => {
                    debug!(code = %code, "Cache hit in Moka");
                    Ok(Some(CacheEntry::new(slot.long_url, ttl)))
                }
            },
            None => {
                trace!(code = %code, "Cache miss in Moka");
                Ok(None)
            }
        }
    }

    async fn set_url(&self, code: &ShortCode, entry: &CacheEntry) -> Result<()> {
        if entry.ttl.is_some_and(|ttl| ttl.is_zero()) {
            self.cache.invalidate(code.as_str()).await;
            return Ok(());
        }

        let slot = Slot {
            long_url: entry.long_url.clone(),
            ttl: entry.ttl,
            inserted_at: Instant::now(),
        };
        self.cache.insert(code.as_str().to_string(), slot).await;
        debug!(code = %code, ttl = ?entry.ttl, "Cached URL in Moka");
        Ok(())
    }

    async fn del(&self, code: &ShortCode) -> Result<()> {
        self.cache.invalidate(code.as_str()).await;
        debug!(code = %code, "Removed URL from Moka cache (if present)");
        Ok(())
    }
}

/// Configuration for a [`MokaUrlCache`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct MokaCacheConfig {
    /// Maximum number of entries the cache can hold.
    #[builder(default = 10_000)]
    pub max_capacity: u64,
    /// Evict entries that have not been read for this long, regardless of ttl.
    #[builder(default, setter(strip_option))]
    pub time_to_idle: Option<Duration>,
}

impl Default for MokaCacheConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl From<MokaCacheConfig> for MokaUrlCache {
    fn from(config: MokaCacheConfig) -> Self {
        let mut builder = Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(SlotExpiry);

        if let Some(tti) = config.time_to_idle {
            builder = builder.time_to_idle(tti);
        }

        MokaUrlCache {
            cache: builder.build(),
        }
    }
}
