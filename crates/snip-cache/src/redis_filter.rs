//! A Bloom filter stored as a Redis bitmap.
//!
//! Bit positions are derived from SHA-256 with double hashing,
//! `h1 + i * h2 (mod m)`, so every instance maps a code to the same bits.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use snip_core::{filter::Result, CacheError, CollisionFilter, ShortCode};
use tracing::{debug, trace, warn};

use crate::{map_redis_error, BloomFilterConfig};

/// Largest bitmap Redis accepts (512 MiB).
const MAX_BITS: u64 = 1 << 32;

/// Bloom filter geometry: `bits` (m) and `hashes` (k).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BloomGeometry {
    pub bits: u64,
    pub hashes: u32,
}

impl BloomGeometry {
    /// `m = -n ln p / (ln 2)^2` and `k = (m / n) ln 2`, each at least 1.
    pub fn for_config(config: &BloomFilterConfig) -> Result<Self> {
        let n = config.expected_items;
        let p = config.false_positive_rate;
        if n == 0 {
            return Err(CacheError::Initialization(
                "expected_items must be greater than zero".to_string(),
            ));
        }
        if !(p > 0.0 && p < 1.0) {
            return Err(CacheError::Initialization(format!(
                "false_positive_rate must be in (0, 1), got {p}"
            )));
        }

        let ln2 = std::f64::consts::LN_2;
        let bits = (-(n as f64) * p.ln() / (ln2 * ln2)).ceil().max(1.0) as u64;
        if bits > MAX_BITS {
            return Err(CacheError::Initialization(format!(
                "filter needs {bits} bits, more than a Redis bitmap holds"
            )));
        }
        let hashes = ((bits as f64 / n as f64) * ln2).round().max(1.0) as u32;

        Ok(Self { bits, hashes })
    }

    fn positions(&self, code: &ShortCode) -> Vec<u64> {
        let digest: [u8; 32] = Sha256::digest(code.as_str().as_bytes()).into();
        let mut h1 = [0u8; 8];
        let mut h2 = [0u8; 8];
        h1.copy_from_slice(&digest[..8]);
        h2.copy_from_slice(&digest[8..16]);
        let h1 = u64::from_be_bytes(h1) as u128;
        // odd stride so consecutive probes never repeat early
        let h2 = (u64::from_be_bytes(h2) | 1) as u128;
        let m = self.bits as u128;

        (0..self.hashes as u128)
            .map(|i| ((h1 + i * h2) % m) as u64)
            .collect()
    }
}

/// A [`CollisionFilter`] whose bits live in a single Redis key.
#[derive(Debug, Clone)]
pub struct RedisBloomFilter {
    conn: redis::aio::MultiplexedConnection,
    key: String,
    geometry: BloomGeometry,
}

impl RedisBloomFilter {
    pub fn new(conn: redis::aio::MultiplexedConnection, config: BloomFilterConfig) -> Result<Self> {
        Self::with_key(conn, "snip:filter:codes", config)
    }

    pub fn with_key(
        conn: redis::aio::MultiplexedConnection,
        key: impl Into<String>,
        config: BloomFilterConfig,
    ) -> Result<Self> {
        let geometry = BloomGeometry::for_config(&config)?;
        debug!(bits = geometry.bits, hashes = geometry.hashes, "Sized Redis Bloom filter");
        Ok(Self {
            conn,
            key: key.into(),
            geometry,
        })
    }

    pub fn geometry(&self) -> BloomGeometry {
        self.geometry
    }
}

#[async_trait]
impl CollisionFilter for RedisBloomFilter {
    async fn might_contain(&self, code: &ShortCode) -> Result<bool> {
        let mut pipe = redis::pipe();
        for position in self.geometry.positions(code) {
            pipe.getbit(&self.key, position as usize);
        }

        let mut conn = self.conn.clone();
        let bits: Vec<i64> = pipe.query_async(&mut conn).await.map_err(|e| {
            warn!(code = %code, error = %e, "Redis error on Bloom filter check");
            map_redis_error("failed to read Bloom filter bits", e)
        })?;

        let present = bits.iter().all(|bit| *bit == 1);
        trace!(code = %code, present, "Checked Redis Bloom filter");
        Ok(present)
    }

    async fn add(&self, code: &ShortCode) -> Result<()> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for position in self.geometry.positions(code) {
            pipe.setbit(&self.key, position as usize, true).ignore();
        }

        let mut conn = self.conn.clone();
        pipe.query_async::<()>(&mut conn).await.map_err(|e| {
            warn!(code = %code, error = %e, "Redis error on Bloom filter add");
            map_redis_error("failed to set Bloom filter bits", e)
        })?;

        trace!(code = %code, "Added code to Redis Bloom filter");
        Ok(())
    }
}
