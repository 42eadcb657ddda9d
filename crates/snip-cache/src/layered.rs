use async_trait::async_trait;
use snip_core::{cache::Result, CacheEntry, ShortCode, UrlCache};
use tracing::{debug, trace, warn};

/// Two caches composed into one.
///
/// L1 is typically a fast local cache (Moka) and L2 a shared one (Redis).
///
/// - **Get**: L1 first; on a miss try L2 and backfill L1 with the lifetime
///   L2 reports, so L1 never outlives L2.
/// - **Set**: L2 then L1.
/// - **Delete**: L1 then L2.
///
/// An L1 failure degrades to L2; only L2 failures are returned.
#[derive(Debug, Clone)]
pub struct LayeredCache<L1, L2> {
    l1: L1,
    l2: L2,
}

impl<L1, L2> LayeredCache<L1, L2> {
    pub fn new(l1: L1, l2: L2) -> Self {
        Self { l1, l2 }
    }

    pub fn l1(&self) -> &L1 {
        &self.l1
    }

    pub fn l2(&self) -> &L2 {
        &self.l2
    }

    pub fn into_inner(self) -> (L1, L2) {
        (self.l1, self.l2)
    }
}

#[async_trait]
impl<L1, L2> UrlCache for LayeredCache<L1, L2>
where
    L1: UrlCache,
    L2: UrlCache,
{
    async fn get_url(&self, code: &ShortCode) -> Result<Option<CacheEntry>> {
        trace!(code = %code, "Fetching URL from layered cache");

        match self.l1.get_url(code).await {
            Ok(Some(entry)) => {
                debug!(code = %code, "L1 cache hit");
                return Ok(Some(entry));
            }
            Ok(None) => trace!(code = %code, "L1 cache miss, trying L2"),
            Err(e) => warn!(code = %code, error = %e, "L1 cache lookup failed, trying L2"),
        }

        match self.l2.get_url(code).await? {
            Some(entry) => {
                debug!(code = %code, "L2 cache hit, backfilling L1");
                if let Err(e) = self.l1.set_url(code, &entry).await {
                    warn!(code = %code, error = %e, "Failed to backfill L1 cache");
                }
                Ok(Some(entry))
            }
            None => {
                trace!(code = %code, "L2 cache miss");
                Ok(None)
            }
        }
    }

    async fn set_url(&self, code: &ShortCode, entry: &CacheEntry) -> Result<()> {
        self.l2.set_url(code, entry).await?;
        debug!(code = %code, "Stored in L2 cache");

        self.l1.set_url(code, entry).await?;
        debug!(code = %code, "Stored in L1 cache");

        Ok(())
    }

    async fn del(&self, code: &ShortCode) -> Result<()> {
        self.l1.del(code).await?;
        self.l2.del(code).await?;
        debug!(code = %code, "Removed from both cache layers");
        Ok(())
    }
}
