use crate::config::{ClickAccounting, ServiceConfig};
use crate::counter::CounterUpdater;
use crate::error::ServiceError;
use crate::ttl::CacheLifetime;
use jiff::{SignedDuration, Timestamp};
use snip_core::{
    AccessLog, AccessLogRepository, CollisionFilter, DistributedLock, Repository, ShortCode,
    ShortUrlRecord, UrlCache, Visit,
};
use snip_generator::HashGenerator;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Expiration policy for a shortened URL.
#[derive(Debug, Clone, Default)]
pub enum ExpirationPolicy {
    #[default]
    Never,
    /// Expires this long after creation.
    AfterDuration(Duration),
    AtTimestamp(Timestamp),
}

/// Parameters for creating a shortened URL.
#[derive(Debug, Clone)]
pub struct ShortenParams {
    pub long_url: String,
    pub expiration: ExpirationPolicy,
    /// A caller-chosen code used instead of a generated one.
    pub custom_alias: Option<String>,
}

impl ShortenParams {
    pub fn new(long_url: impl Into<String>) -> Self {
        Self {
            long_url: long_url.into(),
            expiration: ExpirationPolicy::Never,
            custom_alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.custom_alias = Some(alias.into());
        self
    }

    pub fn with_expiration(mut self, expiration: ExpirationPolicy) -> Self {
        self.expiration = expiration;
        self
    }
}

/// Outcome of resolving a code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(String),
    NotFound,
    /// The code exists but its expiration has passed. Callers should treat
    /// it exactly like [`Resolution::NotFound`].
    Expired,
}

impl Resolution {
    pub fn into_url(self) -> Option<String> {
        match self {
            Resolution::Found(url) => Some(url),
            Resolution::NotFound | Resolution::Expired => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found(_))
    }
}

/// Bumps the counter and appends the access log of one resolution.
struct ClickRecorder<R, L> {
    counter: CounterUpdater<R, L>,
    access_logs: Arc<R>,
}

impl<R, L> Clone for ClickRecorder<R, L> {
    fn clone(&self) -> Self {
        Self {
            counter: self.counter.clone(),
            access_logs: Arc::clone(&self.access_logs),
        }
    }
}

impl<R, L> ClickRecorder<R, L>
where
    R: Repository + AccessLogRepository,
    L: DistributedLock,
{
    async fn record(self, code: ShortCode, visit: Visit) {
        match self.counter.increment(&code).await {
            Ok(count) => trace!(code = %code, count, "Counted click"),
            Err(e) => warn!(code = %code, error = %e, "Failed to count click"),
        }

        if let Err(e) = self
            .access_logs
            .record_access(AccessLog::new(code.clone(), visit))
            .await
        {
            warn!(code = %code, error = %e, "Failed to record access log");
        }
    }
}

/// Creates and resolves short URLs.
///
/// The durable store is authoritative. The cache and the collision filter
/// only make the common paths cheaper, so their failures are logged and
/// worked around. Click accounting never changes a resolution's outcome.
pub struct ResolutionService<R, C, F, L> {
    repository: Arc<R>,
    cache: Arc<C>,
    filter: Arc<F>,
    generator: HashGenerator<F>,
    clicks: ClickRecorder<R, L>,
    config: ServiceConfig,
}

impl<R, C, F, L> ResolutionService<R, C, F, L>
where
    R: Repository + AccessLogRepository,
    C: UrlCache,
    F: CollisionFilter,
    L: DistributedLock,
{
    pub fn new(
        repository: Arc<R>,
        cache: Arc<C>,
        filter: Arc<F>,
        lock: Arc<L>,
        config: ServiceConfig,
    ) -> Self {
        let generator = HashGenerator::with_settings(Arc::clone(&filter), config.generator_settings());
        let counter = CounterUpdater::new(Arc::clone(&repository), lock, config.lock_wait);
        let clicks = ClickRecorder {
            counter,
            access_logs: Arc::clone(&repository),
        };

        Self {
            repository,
            cache,
            filter,
            generator,
            clicks,
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// The public URL of `code`.
    pub fn short_url(&self, code: &ShortCode) -> String {
        code.to_url(&self.config.base_url)
    }

    /// Creates a short URL and returns its code.
    pub async fn shorten(&self, params: ShortenParams) -> Result<ShortCode, ServiceError> {
        validate_url(&params.long_url)?;

        let now = Timestamp::now();
        let expires_at = resolve_expiration(&params.expiration, now)?;

        let (code, is_alias) = match params.custom_alias {
            Some(alias) => {
                let code = ShortCode::new(alias)?;
                self.precheck_alias(&code).await;
                (code, true)
            }
            None => (self.generator.generate(&params.long_url).await?, false),
        };

        let record = ShortUrlRecord {
            code: code.clone(),
            long_url: params.long_url,
            created_at: now,
            expires_at,
            click_count: 0,
        };

        if let Err(e) = self.repository.insert(record.clone()).await {
            let err = ServiceError::from(e);
            if matches!(err, ServiceError::Conflict(_)) {
                info!(code = %code, "Short code already taken");
            }
            return Err(err);
        }

        if is_alias {
            if let Err(e) = self.filter.add(&code).await {
                warn!(code = %code, error = %e, "Failed to add alias to collision filter");
            }
        }

        self.populate_cache(&record).await;
        info!(code = %code, expires_at = ?record.expires_at, "Created short url");
        Ok(code)
    }

    /// Resolves `code` without request metadata.
    pub async fn resolve(&self, code: &ShortCode) -> Result<Resolution, ServiceError> {
        self.resolve_visit(code, Visit::default()).await
    }

    /// Resolves `code` and accounts a click carrying `visit`.
    pub async fn resolve_visit(
        &self,
        code: &ShortCode,
        visit: Visit,
    ) -> Result<Resolution, ServiceError> {
        match self.cache.get_url(code).await {
            Ok(Some(entry)) => {
                debug!(code = %code, "Resolved from cache");
                self.account_click(code, visit).await;
                return Ok(Resolution::Found(entry.long_url));
            }
            Ok(None) => trace!(code = %code, "Cache miss"),
            Err(e) => warn!(code = %code, error = %e, "Cache lookup failed, reading store"),
        }

        let Some(record) = self.repository.get(code).await? else {
            debug!(code = %code, "Short code not found");
            return Ok(Resolution::NotFound);
        };

        let now = Timestamp::now();
        if record.is_expired_at(now) {
            info!(code = %code, expires_at = ?record.expires_at, "Short code expired");
            return Ok(Resolution::Expired);
        }

        self.populate_cache(&record).await;
        self.account_click(code, visit).await;
        Ok(Resolution::Found(record.long_url))
    }

    /// The authoritative record of `code`, click count included.
    pub async fn stats(&self, code: &ShortCode) -> Result<Option<ShortUrlRecord>, ServiceError> {
        Ok(self.repository.get(code).await?)
    }

    // A filter hit on an alias is only a hint; the insert decides.
    async fn precheck_alias(&self, code: &ShortCode) {
        match self.filter.might_contain(code).await {
            Ok(true) => debug!(code = %code, "Alias probably taken, letting the store decide"),
            Ok(false) => {}
            Err(e) => warn!(code = %code, error = %e, "Collision filter lookup failed"),
        }
    }

    // Remaining validity is taken at write time.
    async fn populate_cache(&self, record: &ShortUrlRecord) {
        let lifetime =
            CacheLifetime::for_record(record, Timestamp::now(), self.config.max_cache_ttl);
        let Some(entry) = lifetime.entry(&record.long_url) else {
            trace!(code = %record.code, "Record not cacheable");
            return;
        };

        if let Err(e) = self.cache.set_url(&record.code, &entry).await {
            warn!(code = %record.code, error = %e, "Failed to populate cache");
        }
    }

    async fn account_click(&self, code: &ShortCode, visit: Visit) {
        let clicks = self.clicks.clone();
        match self.config.click_accounting {
            ClickAccounting::Inline => clicks.record(code.clone(), visit).await,
            ClickAccounting::Detached => {
                tokio::spawn(clicks.record(code.clone(), visit));
            }
        }
    }
}

/// Checks that the URL has an http(s) scheme and something after it.
fn validate_url(url: &str) -> Result<(), ServiceError> {
    if url.is_empty() {
        return Err(ServiceError::InvalidUrl("URL cannot be empty".to_string()));
    }

    let Some((scheme, rest)) = url.split_once("://") else {
        return Err(ServiceError::InvalidUrl(format!(
            "URL must have a scheme and host: {url}"
        )));
    };

    if rest.is_empty() || rest.starts_with('/') {
        return Err(ServiceError::InvalidUrl(format!(
            "URL must have a host: {url}"
        )));
    }

    let scheme = scheme.to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(ServiceError::InvalidUrl(format!(
            "URL scheme must be http or https: {scheme}"
        )));
    }

    Ok(())
}

/// Turns a policy into an absolute deadline, rejecting deadlines at or
/// before `now`.
fn resolve_expiration(
    policy: &ExpirationPolicy,
    now: Timestamp,
) -> Result<Option<Timestamp>, ServiceError> {
    let expires_at = match policy {
        ExpirationPolicy::Never => return Ok(None),
        ExpirationPolicy::AfterDuration(duration) => {
            let offset = SignedDuration::try_from(*duration)
                .map_err(|e| ServiceError::InvalidExpiration(e.to_string()))?;
            now.checked_add(offset)
                .map_err(|e| ServiceError::InvalidExpiration(e.to_string()))?
        }
        ExpirationPolicy::AtTimestamp(timestamp) => *timestamp,
    };

    if expires_at <= now {
        return Err(ServiceError::AlreadyExpired(expires_at.to_string()));
    }
    Ok(Some(expires_at))
}
