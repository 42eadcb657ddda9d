use async_trait::async_trait;
use dashmap::DashMap;
use jiff::Timestamp;
use snip_core::{lock::Result, DistributedLock, LockError, LockLease};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use typed_builder::TypedBuilder;

/// Deletes the key only if it still holds the caller's token.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

#[derive(Debug, Clone, TypedBuilder)]
pub struct RedisLockConfig {
    /// Expiry of a held lock. A crashed holder's lock frees itself after this.
    ///
    /// The lease is never extended, so it must exceed the worst-case duration
    /// of the critical section (a store read plus a store write). A holder
    /// that overruns it can lose its update to the next holder; such
    /// overruns are logged on release.
    #[builder(default = Duration::from_secs(5))]
    pub lease: Duration,
    /// Pause between attempts while the lock is taken.
    #[builder(default = Duration::from_millis(25))]
    pub retry_interval: Duration,
    #[builder(default = "snip:".to_string(), setter(into))]
    pub key_prefix: String,
}

impl Default for RedisLockConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A [`DistributedLock`] on a single Redis node.
///
/// Acquisition is `SET key token NX PX lease`, retried until the wait runs
/// out. Release compares the token before deleting, so an expired lease can
/// never unlock a later holder.
pub struct RedisLock {
    conn: redis::aio::MultiplexedConnection,
    config: RedisLockConfig,
    release_script: redis::Script,
    counter: AtomicU64,
    acquired_at: DashMap<String, Instant>,
}

impl RedisLock {
    pub fn new(conn: redis::aio::MultiplexedConnection) -> Self {
        Self::with_config(conn, RedisLockConfig::default())
    }

    pub fn with_config(conn: redis::aio::MultiplexedConnection, config: RedisLockConfig) -> Self {
        Self {
            conn,
            config,
            release_script: redis::Script::new(RELEASE_SCRIPT),
            counter: AtomicU64::new(0),
            acquired_at: DashMap::new(),
        }
    }

    fn redis_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    // Unique across instances: process id, wall clock and a local counter.
    fn next_token(&self) -> String {
        format!(
            "{}-{}-{}",
            std::process::id(),
            Timestamp::now().as_nanosecond(),
            self.counter.fetch_add(1, Ordering::Relaxed)
        )
    }

    async fn try_acquire(&self, redis_key: &str, token: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(redis_key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(self.config.lease.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| LockError::Backend(format!("SET NX on '{redis_key}': {e}")))?;
        Ok(reply.is_some())
    }
}

#[async_trait]
impl DistributedLock for RedisLock {
    async fn acquire(&self, key: &str, wait: Duration) -> Result<LockLease> {
        let redis_key = self.redis_key(key);
        let token = self.next_token();
        let deadline = Instant::now() + wait;

        loop {
            if self.try_acquire(&redis_key, &token).await? {
                trace!(key, "Acquired Redis lock");
                self.acquired_at.insert(token.clone(), Instant::now());
                return Ok(LockLease::new(key, token));
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(key, "Timed out waiting for Redis lock");
                return Err(LockError::Timeout(key.to_string()));
            }
            tokio::time::sleep(self.config.retry_interval.min(deadline - now)).await;
        }
    }

    async fn release(&self, lease: LockLease) -> Result<()> {
        let redis_key = self.redis_key(lease.key());
        let mut conn = self.conn.clone();

        if let Some((_, acquired_at)) = self.acquired_at.remove(lease.token()) {
            if let Some(overrun) = lease_overrun(acquired_at.elapsed(), self.config.lease) {
                warn!(
                    key = lease.key(),
                    lease_ms = self.config.lease.as_millis() as u64,
                    overrun_ms = overrun.as_millis() as u64,
                    "Held Redis lock past its lease, a concurrent holder may have lost an update"
                );
            }
        }

        let deleted: i64 = self
            .release_script
            .key(&redis_key)
            .arg(lease.token())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| LockError::Backend(format!("release of '{redis_key}': {e}")))?;

        if deleted == 0 {
            warn!(key = lease.key(), "Redis lock expired before release");
            return Err(LockError::NotHeld(lease.key().to_string()));
        }
        trace!(key = lease.key(), "Released Redis lock");
        Ok(())
    }
}

/// How far `held_for` ran past `lease`, if it reached it at all.
fn lease_overrun(held_for: Duration, lease: Duration) -> Option<Duration> {
    (held_for >= lease).then(|| held_for - lease)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrun_is_reported_from_the_lease_boundary() {
        let lease = Duration::from_secs(5);
        assert_eq!(lease_overrun(Duration::from_millis(4_999), lease), None);
        assert_eq!(lease_overrun(lease, lease), Some(Duration::ZERO));
        assert_eq!(
            lease_overrun(Duration::from_millis(5_250), lease),
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn default_config() {
        let config = RedisLockConfig::default();
        assert_eq!(config.lease, Duration::from_secs(5));
        assert_eq!(config.retry_interval, Duration::from_millis(25));
        assert_eq!(config.key_prefix, "snip:");
    }
}
