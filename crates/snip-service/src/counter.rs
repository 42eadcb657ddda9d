use crate::error::CounterError;
use snip_core::{DistributedLock, Repository, ShortCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

/// The lock guarding the click counter of `code`.
pub fn counter_lock_key(code: &ShortCode) -> String {
    format!("lock:count:{}", code.as_str())
}

/// Serializes read-modify-write click increments per code.
///
/// The critical section runs in its own task, so a caller that drops the
/// returned future still lets the increment finish and the lock go.
pub struct CounterUpdater<R, L> {
    repository: Arc<R>,
    lock: Arc<L>,
    lock_wait: Duration,
}

impl<R, L> Clone for CounterUpdater<R, L> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            lock: Arc::clone(&self.lock),
            lock_wait: self.lock_wait,
        }
    }
}

impl<R: Repository, L: DistributedLock> CounterUpdater<R, L> {
    pub fn new(repository: Arc<R>, lock: Arc<L>, lock_wait: Duration) -> Self {
        Self {
            repository,
            lock,
            lock_wait,
        }
    }

    /// Adds one click to `code` and returns the new count.
    pub async fn increment(&self, code: &ShortCode) -> Result<u64, CounterError> {
        let repository = Arc::clone(&self.repository);
        let lock = Arc::clone(&self.lock);
        let wait = self.lock_wait;
        let code = code.clone();

        let task = tokio::spawn(async move {
            let lease = lock.acquire(&counter_lock_key(&code), wait).await?;
            trace!(code = %code, "Holding counter lock");

            let result = repository.increment_click_count(&code).await;

            if let Err(e) = lock.release(lease).await {
                warn!(code = %code, error = %e, "Failed to release counter lock");
            }
            Ok::<_, CounterError>(result?)
        });

        task.await
            .map_err(|e| CounterError::Aborted(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use snip_cache::LocalLock;
    use snip_core::repository::Result as StorageResult;
    use snip_core::{LockError, ReadRepository, ShortUrlRecord, StorageError};
    use snip_storage::InMemoryRepository;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    /// Yields between the read and the write of an increment so unguarded
    /// increments interleave.
    struct SlowRepository {
        inner: InMemoryRepository,
    }

    #[async_trait]
    impl ReadRepository for SlowRepository {
        async fn get(&self, code: &ShortCode) -> StorageResult<Option<ShortUrlRecord>> {
            let record = self.inner.get(code).await;
            tokio::task::yield_now().await;
            record
        }
    }

    #[async_trait]
    impl Repository for SlowRepository {
        async fn insert(&self, record: ShortUrlRecord) -> StorageResult<()> {
            self.inner.insert(record).await
        }

        async fn update_click_count(&self, code: &ShortCode, click_count: u64) -> StorageResult<()> {
            tokio::task::yield_now().await;
            self.inner.update_click_count(code, click_count).await
        }
    }

    /// Parks the first write until the test opens the gate.
    struct GatedRepository {
        inner: InMemoryRepository,
        gated: AtomicBool,
        entered: Notify,
        open: Notify,
    }

    #[async_trait]
    impl ReadRepository for GatedRepository {
        async fn get(&self, code: &ShortCode) -> StorageResult<Option<ShortUrlRecord>> {
            self.inner.get(code).await
        }
    }

    #[async_trait]
    impl Repository for GatedRepository {
        async fn insert(&self, record: ShortUrlRecord) -> StorageResult<()> {
            self.inner.insert(record).await
        }

        async fn update_click_count(&self, code: &ShortCode, click_count: u64) -> StorageResult<()> {
            if self.gated.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.open.notified().await;
            }
            self.inner.update_click_count(code, click_count).await
        }
    }

    async fn seeded(code: &ShortCode) -> Arc<SlowRepository> {
        let repo = SlowRepository {
            inner: InMemoryRepository::new(),
        };
        repo.insert(ShortUrlRecord::new(code.clone(), "https://example.com", None))
            .await
            .unwrap();
        Arc::new(repo)
    }

    #[test]
    fn lock_key_format() {
        assert_eq!(
            counter_lock_key(&ShortCode::new_unchecked("abc123")),
            "lock:count:abc123"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() {
        let code = ShortCode::new_unchecked("hot");
        let repo = seeded(&code).await;
        let lock = Arc::new(LocalLock::new());
        let counter = CounterUpdater::new(repo.clone(), lock.clone(), Duration::from_secs(5));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let counter = counter.clone();
            let code = code.clone();
            handles.push(tokio::spawn(async move { counter.increment(&code).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(repo.get(&code).await.unwrap().unwrap().click_count, 50);
        assert_eq!(lock.held(), 0);
    }

    #[tokio::test]
    async fn aborted_caller_still_completes_increment_and_releases_lock() {
        let code = ShortCode::new_unchecked("gated");
        let repo = Arc::new(GatedRepository {
            inner: InMemoryRepository::new(),
            gated: AtomicBool::new(true),
            entered: Notify::new(),
            open: Notify::new(),
        });
        repo.insert(ShortUrlRecord::new(code.clone(), "https://example.com", None))
            .await
            .unwrap();
        let lock = Arc::new(LocalLock::new());
        let counter = CounterUpdater::new(repo.clone(), lock.clone(), Duration::from_secs(1));

        let caller = {
            let counter = counter.clone();
            let code = code.clone();
            tokio::spawn(async move { counter.increment(&code).await })
        };

        repo.entered.notified().await;
        assert_eq!(lock.held(), 1);
        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());

        repo.open.notify_one();
        for _ in 0..100 {
            if lock.held() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(lock.held(), 0);
        assert_eq!(repo.get(&code).await.unwrap().unwrap().click_count, 1);
        assert_eq!(counter.increment(&code).await.unwrap(), 2);
        assert_eq!(lock.held(), 0);
    }

    #[tokio::test]
    async fn lock_timeout_is_reported() {
        let code = ShortCode::new_unchecked("busy");
        let repo = seeded(&code).await;
        let lock = Arc::new(LocalLock::new());
        let _held = lock
            .acquire(&counter_lock_key(&code), Duration::from_millis(10))
            .await
            .unwrap();

        let counter = CounterUpdater::new(repo.clone(), lock, Duration::from_millis(20));
        let err = counter.increment(&code).await.unwrap_err();

        assert!(matches!(err, CounterError::Lock(LockError::Timeout(_))));
        assert_eq!(repo.get(&code).await.unwrap().unwrap().click_count, 0);
    }

    #[tokio::test]
    async fn lock_is_released_when_update_fails() {
        let repo = Arc::new(SlowRepository {
            inner: InMemoryRepository::new(),
        });
        let lock = Arc::new(LocalLock::new());
        let counter = CounterUpdater::new(repo, lock.clone(), Duration::from_millis(50));

        let err = counter
            .increment(&ShortCode::new_unchecked("gone"))
            .await
            .unwrap_err();

        assert!(matches!(err, CounterError::Storage(StorageError::NotFound(_))));
        assert_eq!(lock.held(), 0);
    }

    #[tokio::test]
    async fn different_codes_do_not_share_a_lock() {
        let a = ShortCode::new_unchecked("aaa");
        let b = ShortCode::new_unchecked("bbb");
        let repo = seeded(&a).await;
        repo.insert(ShortUrlRecord::new(b.clone(), "https://b.io", None))
            .await
            .unwrap();

        let lock = Arc::new(LocalLock::new());
        let _held_a = lock
            .acquire(&counter_lock_key(&a), Duration::from_millis(10))
            .await
            .unwrap();

        let counter = CounterUpdater::new(repo, lock, Duration::from_millis(20));
        assert_eq!(counter.increment(&b).await.unwrap(), 1);
    }
}
