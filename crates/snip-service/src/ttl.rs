use jiff::Timestamp;
use snip_core::{CacheEntry, ShortUrlRecord};
use std::time::Duration;

/// How long a record may live in the cache.
///
/// A cached entry must never outlive the record it mirrors, so the lifetime
/// is the record's remaining validity, truncated to whole milliseconds and
/// capped by the configured maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLifetime {
    /// Do not cache: expired, or under a millisecond left.
    Skip,
    For(Duration),
    Unbounded,
}

impl CacheLifetime {
    pub fn compute(
        expires_at: Option<Timestamp>,
        now: Timestamp,
        max_cache_ttl: Option<Duration>,
    ) -> Self {
        let remaining = match expires_at {
            None => return max_cache_ttl.map_or(Self::Unbounded, Self::bounded),
            Some(deadline) => deadline.duration_since(now),
        };

        let millis = remaining.as_millis();
        if millis < 1 {
            return Self::Skip;
        }
        let ttl = Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX));
        Self::bounded(max_cache_ttl.map_or(ttl, |max| ttl.min(max)))
    }

    pub fn for_record(record: &ShortUrlRecord, now: Timestamp, max_cache_ttl: Option<Duration>) -> Self {
        Self::compute(record.expires_at, now, max_cache_ttl)
    }

    /// The entry to write, if any.
    pub fn entry(self, long_url: &str) -> Option<CacheEntry> {
        match self {
            Self::Skip => None,
            Self::For(ttl) => Some(CacheEntry::new(long_url, Some(ttl))),
            Self::Unbounded => Some(CacheEntry::new(long_url, None)),
        }
    }

    fn bounded(ttl: Duration) -> Self {
        if ttl.is_zero() {
            Self::Skip
        } else {
            Self::For(ttl)
        }
    }
}
