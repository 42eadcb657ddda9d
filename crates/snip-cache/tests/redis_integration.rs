use std::sync::Arc;
use std::time::Duration;

use snip_cache::{BloomFilterConfig, RedisBloomFilter, RedisLock, RedisLockConfig, RedisUrlCache};
use snip_core::{CacheEntry, CollisionFilter, DistributedLock, LockError, ShortCode, UrlCache};
use snip_test_infra::RedisServer;

struct Fixture {
    redis: RedisServer,
}

impl Fixture {
    async fn start() -> Self {
        let redis = RedisServer::new().await.expect("start redis");
        Self { redis }
    }

    async fn conn(&self) -> redis::aio::MultiplexedConnection {
        self.redis.connection().await.expect("redis connection")
    }
}

fn code(s: &str) -> ShortCode {
    ShortCode::new_unchecked(s)
}

#[tokio::test]
async fn cache_get_set_del() {
    let fixture = Fixture::start().await;
    let cache = RedisUrlCache::new(fixture.conn().await);
    let c = code("abc123");

    assert!(cache.get_url(&c).await.unwrap().is_none());

    cache
        .set_url(&c, &CacheEntry::new("https://example.com", None))
        .await
        .unwrap();
    let entry = cache.get_url(&c).await.unwrap().unwrap();
    assert_eq!(entry.long_url, "https://example.com");
    assert_eq!(entry.ttl, None);

    cache.del(&c).await.unwrap();
    assert!(cache.get_url(&c).await.unwrap().is_none());
}

#[tokio::test]
async fn cache_reports_remaining_ttl_and_expires() {
    let fixture = Fixture::start().await;
    let cache = RedisUrlCache::new(fixture.conn().await);
    let c = code("short");

    cache
        .set_url(&c, &CacheEntry::new("https://example.com", Some(Duration::from_millis(300))))
        .await
        .unwrap();

    let ttl = cache.get_url(&c).await.unwrap().unwrap().ttl.unwrap();
    assert!(ttl <= Duration::from_millis(300));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(cache.get_url(&c).await.unwrap().is_none());
}

#[tokio::test]
async fn cache_uses_key_prefix() {
    let fixture = Fixture::start().await;
    let mut conn = fixture.conn().await;
    let cache = RedisUrlCache::with_prefix(conn.clone(), "test:");

    cache
        .set_url(&code("abc123"), &CacheEntry::new("https://example.com", None))
        .await
        .unwrap();

    let raw: Option<String> = redis::AsyncCommands::get(&mut conn, "test:abc123")
        .await
        .unwrap();
    assert_eq!(raw.as_deref(), Some("https://example.com"));
}

#[tokio::test]
async fn filter_is_shared_between_instances() {
    let fixture = Fixture::start().await;
    let config = BloomFilterConfig::builder()
        .expected_items(10_000)
        .false_positive_rate(0.01)
        .build();
    let a = RedisBloomFilter::new(fixture.conn().await, config.clone()).unwrap();
    let b = RedisBloomFilter::new(fixture.conn().await, config).unwrap();

    let c = code("aRqwDqr");
    assert!(!b.might_contain(&c).await.unwrap());

    a.add(&c).await.unwrap();
    assert!(b.might_contain(&c).await.unwrap());
}

#[tokio::test]
async fn filter_has_no_false_negatives() {
    let fixture = Fixture::start().await;
    let filter = RedisBloomFilter::new(
        fixture.conn().await,
        BloomFilterConfig::builder().expected_items(1_000).build(),
    )
    .unwrap();

    let codes: Vec<ShortCode> = (0..200).map(|i| code(&format!("c{i}"))).collect();
    for c in &codes {
        filter.add(c).await.unwrap();
    }
    for c in &codes {
        assert!(filter.might_contain(c).await.unwrap());
    }
}

#[tokio::test]
async fn lock_excludes_second_holder_until_release() {
    let fixture = Fixture::start().await;
    let a = RedisLock::new(fixture.conn().await);
    let b = RedisLock::new(fixture.conn().await);

    let lease = a
        .acquire("lock:count:abc", Duration::from_millis(100))
        .await
        .unwrap();

    let err = b
        .acquire("lock:count:abc", Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, LockError::Timeout(_)));

    a.release(lease).await.unwrap();
    let lease = b
        .acquire("lock:count:abc", Duration::from_millis(100))
        .await
        .unwrap();
    b.release(lease).await.unwrap();
}

#[tokio::test]
async fn expired_lease_frees_lock_and_cannot_release_new_holder() {
    let fixture = Fixture::start().await;
    let config = RedisLockConfig::builder()
        .lease(Duration::from_millis(100))
        .build();
    let a = RedisLock::with_config(fixture.conn().await, config.clone());
    let b = RedisLock::with_config(fixture.conn().await, config);

    let stale = a.acquire("k", Duration::from_millis(10)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let fresh = b.acquire("k", Duration::from_millis(10)).await.unwrap();
    let err = a.release(stale).await.unwrap_err();
    assert!(matches!(err, LockError::NotHeld(_)));

    b.release(fresh).await.unwrap();
}

#[tokio::test]
async fn waiter_acquires_after_release() {
    let fixture = Fixture::start().await;
    let lock = Arc::new(RedisLock::new(fixture.conn().await));

    let lease = lock.acquire("k", Duration::from_millis(10)).await.unwrap();
    let waiter = {
        let lock = lock.clone();
        tokio::spawn(async move { lock.acquire("k", Duration::from_secs(2)).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    lock.release(lease).await.unwrap();

    assert!(waiter.await.unwrap().is_ok());
}
