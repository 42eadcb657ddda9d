//! In-process Bloom filter over issued short codes.
//!
//! Each instance keeps its own bit array, so codes issued by other
//! instances are invisible to it. Use it for tests and single-node
//! deployments; [`RedisBloomFilter`](crate::RedisBloomFilter) shares the
//! state across instances.

use async_trait::async_trait;
use bloomfilter::Bloom;
use parking_lot::RwLock;
use snip_core::{filter::Result, CacheError, CollisionFilter, ShortCode};
use tracing::trace;
use typed_builder::TypedBuilder;

/// Sizing of a Bloom filter.
///
/// The filter trades a small false positive rate for memory. Inserting more
/// than `expected_items` codes makes false positives more frequent.
#[derive(Debug, Clone, TypedBuilder)]
pub struct BloomFilterConfig {
    /// Expected number of codes ever issued.
    #[builder(default = 1_000_000)]
    pub expected_items: usize,

    /// Target false positive rate, strictly between 0.0 and 1.0.
    #[builder(default = 0.01)]
    pub false_positive_rate: f64,
}

impl Default for BloomFilterConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A [`CollisionFilter`] backed by an in-memory Bloom filter.
pub struct BloomCollisionFilter {
    bloom: RwLock<Bloom<str>>,
}

impl BloomCollisionFilter {
    /// Returns `CacheError::Initialization` for an unusable sizing.
    pub fn new(config: BloomFilterConfig) -> Result<Self> {
        let bloom = Bloom::new_for_fp_rate(config.expected_items, config.false_positive_rate)
            .map_err(|e| CacheError::Initialization(e.to_string()))?;
        Ok(Self {
            bloom: RwLock::new(bloom),
        })
    }
}

#[async_trait]
impl CollisionFilter for BloomCollisionFilter {
    async fn might_contain(&self, code: &ShortCode) -> Result<bool> {
        let present = self.bloom.read().check(code.as_str());
        trace!(code = %code, present, "Checked in-memory Bloom filter");
        Ok(present)
    }

    async fn add(&self, code: &ShortCode) -> Result<()> {
        self.bloom.write().set(code.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snip_core::ShortCodeBase62;

    fn filter() -> BloomCollisionFilter {
        BloomCollisionFilter::new(
            BloomFilterConfig::builder()
                .expected_items(1_000)
                .false_positive_rate(0.01)
                .build(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn empty_filter_contains_nothing() {
        let filter = filter();
        assert!(!filter
            .might_contain(&ShortCode::new_unchecked("abc123"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn no_false_negatives() {
        let filter = filter();
        let codes: Vec<ShortCode> = (0..500)
            .map(|i| ShortCode::new_unchecked(format!("code{i}")))
            .collect();

        for code in &codes {
            filter.add(code).await.unwrap();
        }
        for code in &codes {
            assert!(filter.might_contain(code).await.unwrap(), "missing {code}");
        }
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let filter = filter();
        let code = ShortCode::new_unchecked("promo1");

        filter.add(&code).await.unwrap();
        filter.add(&code).await.unwrap();

        assert!(filter.might_contain(&code).await.unwrap());
    }

    #[tokio::test]
    async fn generated_and_custom_codes_share_membership() {
        let filter = filter();
        let generated = ShortCode::generated(ShortCodeBase62::from_digest([62], 7));

        filter.add(&generated).await.unwrap();
        assert!(filter
            .might_contain(&ShortCode::new_unchecked("10"))
            .await
            .unwrap());
    }
}
