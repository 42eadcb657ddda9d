use async_trait::async_trait;
use dashmap::DashMap;
use snip_core::{lock::Result, DistributedLock, LockError, LockLease};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// An in-process [`DistributedLock`].
///
/// Each key maps to its own `tokio` mutex; held guards are parked by lease
/// token until released. Only coordinates tasks inside one process.
#[derive(Debug, Default)]
pub struct LocalLock {
    slots: DashMap<String, Arc<Mutex<()>>>,
    held: DashMap<String, (String, OwnedMutexGuard<()>)>,
    next_token: AtomicU64,
}

impl LocalLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of leases currently held.
    pub fn held(&self) -> usize {
        self.held.len()
    }

    // A slot referenced only by the map has no holder and no waiter.
    fn drop_idle_slot(&self, key: &str) {
        self.slots
            .remove_if(key, |_, slot| Arc::strong_count(slot) == 1);
    }
}

#[async_trait]
impl DistributedLock for LocalLock {
    async fn acquire(&self, key: &str, wait: Duration) -> Result<LockLease> {
        let slot = Arc::clone(&self.slots.entry(key.to_string()).or_default());

        let acquired = tokio::time::timeout(wait, slot.lock_owned()).await;
        let Ok(guard) = acquired else {
            self.drop_idle_slot(key);
            return Err(LockError::Timeout(key.to_string()));
        };

        let token = self.next_token.fetch_add(1, Ordering::Relaxed).to_string();
        self.held.insert(token.clone(), (key.to_string(), guard));
        trace!(key, token = %token, "Acquired local lock");
        Ok(LockLease::new(key, token))
    }

    async fn release(&self, lease: LockLease) -> Result<()> {
        let released = self
            .held
            .remove_if(lease.token(), |_, (key, _)| key == lease.key());

        match released {
            Some(entry) => {
                drop(entry);
                self.drop_idle_slot(lease.key());
                trace!(key = lease.key(), "Released local lock");
                Ok(())
            }
            None => Err(LockError::NotHeld(lease.key().to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_and_release() {
        let lock = LocalLock::new();
        let lease = lock.acquire("k", Duration::from_millis(10)).await.unwrap();
        assert_eq!(lease.key(), "k");
        assert_eq!(lock.held(), 1);

        lock.release(lease).await.unwrap();
        assert_eq!(lock.held(), 0);
    }

    #[tokio::test]
    async fn second_acquire_times_out_while_held() {
        let lock = LocalLock::new();
        let _lease = lock.acquire("k", Duration::from_millis(10)).await.unwrap();

        let err = lock
            .acquire("k", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::Timeout(key) if key == "k"));
    }

    #[tokio::test]
    async fn different_keys_do_not_contend() {
        let lock = LocalLock::new();
        let _a = lock.acquire("a", Duration::from_millis(10)).await.unwrap();
        let b = lock.acquire("b", Duration::from_millis(10)).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn waiter_gets_lock_after_release() {
        let lock = Arc::new(LocalLock::new());
        let lease = lock.acquire("k", Duration::from_millis(10)).await.unwrap();

        let waiter = {
            let lock = lock.clone();
            tokio::spawn(async move { lock.acquire("k", Duration::from_secs(1)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        lock.release(lease).await.unwrap();

        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn released_keys_do_not_accumulate() {
        let lock = LocalLock::new();
        for i in 0..100 {
            let lease = lock
                .acquire(&format!("lock:count:{i}"), Duration::from_millis(10))
                .await
                .unwrap();
            lock.release(lease).await.unwrap();
        }
        assert_eq!(lock.slots.len(), 0);
    }

    #[tokio::test]
    async fn slot_survives_release_while_a_waiter_queues() {
        let lock = Arc::new(LocalLock::new());
        let lease = lock.acquire("k", Duration::from_millis(10)).await.unwrap();

        let waiter = {
            let lock = lock.clone();
            tokio::spawn(async move { lock.acquire("k", Duration::from_secs(1)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        lock.release(lease).await.unwrap();

        let second = waiter.await.unwrap().unwrap();
        assert_eq!(lock.held(), 1);
        assert!(lock
            .acquire("k", Duration::from_millis(20))
            .await
            .is_err());

        lock.release(second).await.unwrap();
        assert_eq!(lock.slots.len(), 0);
    }

    #[tokio::test]
    async fn timed_out_acquire_leaves_holder_slot_in_place() {
        let lock = LocalLock::new();
        let lease = lock.acquire("k", Duration::from_millis(10)).await.unwrap();
        assert!(lock.acquire("k", Duration::from_millis(20)).await.is_err());
        assert_eq!(lock.slots.len(), 1);

        lock.release(lease).await.unwrap();
        assert_eq!(lock.slots.len(), 0);
    }

    #[tokio::test]
    async fn releasing_twice_is_not_held() {
        let lock = LocalLock::new();
        let lease = lock.acquire("k", Duration::from_millis(10)).await.unwrap();

        lock.release(lease.clone()).await.unwrap();
        let err = lock.release(lease).await.unwrap_err();
        assert!(matches!(err, LockError::NotHeld(_)));
    }
}
