use async_trait::async_trait;
use redis::AsyncCommands;
use snip_core::{cache::Result, CacheEntry, ShortCode, UrlCache};
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::map_redis_error;

/// A Redis-backed resolution cache shared by every instance.
///
/// Values are the bare long URL. Expiration is delegated to Redis
/// (`PSETEX`), and reads report the remaining lifetime from `PTTL`.
#[derive(Debug, Clone)]
pub struct RedisUrlCache {
    conn: redis::aio::MultiplexedConnection,
    key_prefix: String,
}

impl RedisUrlCache {
    pub fn new(conn: redis::aio::MultiplexedConnection) -> Self {
        Self::with_prefix(conn, "snip:url:")
    }

    /// Creates a cache with a custom key prefix (e.g. `"myapp:url:"`).
    pub fn with_prefix(
        conn: redis::aio::MultiplexedConnection,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.into(),
        }
    }

    fn cache_key(&self, code: &ShortCode) -> String {
        format!("{}{}", self.key_prefix, code.as_str())
    }
}

/// Interprets a `PTTL` reply. `-1` is "no expiry"; `-2` (missing key) never
/// reaches here because the value was present.
fn ttl_from_pttl(pttl: i64) -> Option<Duration> {
    u64::try_from(pttl).ok().map(Duration::from_millis)
}

#[async_trait]
impl UrlCache for RedisUrlCache {
    async fn get_url(&self, code: &ShortCode) -> Result<Option<CacheEntry>> {
        let key = self.cache_key(code);
        trace!(code = %code, "Fetching URL from Redis cache");

        let mut conn = self.conn.clone();
        let reply: redis::RedisResult<(Option<String>, i64)> = redis::pipe()
            .atomic()
            .get(&key)
            .pttl(&key)
            .query_async(&mut conn)
            .await;

        match reply {
            Ok((Some(long_url), pttl)) => {
                debug!(code = %code, pttl, "Cache hit in Redis");
                Ok(Some(CacheEntry::new(long_url, ttl_from_pttl(pttl))))
            }
            Ok((None, _)) => {
                trace!(code = %code, "Cache miss in Redis");
                Ok(None)
            }
            Err(e) => {
                warn!(code = %code, error = %e, "Redis error on get");
                Err(map_redis_error("failed to fetch value from Redis", e))
            }
        }
    }

    async fn set_url(&self, code: &ShortCode, entry: &CacheEntry) -> Result<()> {
        let key = self.cache_key(code);
        let mut conn = self.conn.clone();

        let written = match entry.ttl.map(|ttl| ttl.as_millis() as u64) {
            // PSETEX rejects zero, and a zero lifetime means "do not cache".
            Some(0) => conn.del::<_, ()>(&key).await,
            Some(millis) => conn.pset_ex::<_, _, ()>(&key, &entry.long_url, millis).await,
            None => conn.set::<_, _, ()>(&key, &entry.long_url).await,
        };

        match written {
            Ok(()) => {
                debug!(code = %code, ttl = ?entry.ttl, "Cached URL in Redis");
                Ok(())
            }
            Err(e) => {
                warn!(code = %code, error = %e, "Failed to cache URL in Redis");
                Err(map_redis_error("failed to write value to Redis", e))
            }
        }
    }

    async fn del(&self, code: &ShortCode) -> Result<()> {
        let key = self.cache_key(code);

        let mut conn = self.conn.clone();
        match conn.del::<_, ()>(&key).await {
            Ok(()) => {
                debug!(code = %code, "Removed URL from Redis cache");
                Ok(())
            }
            Err(e) => {
                warn!(code = %code, error = %e, "Failed to remove URL from Redis cache");
                Err(map_redis_error("failed to delete value from Redis", e))
            }
        }
    }
}
