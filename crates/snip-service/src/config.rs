use snip_generator::{GeneratorSettings, DEFAULT_CODE_LENGTH, DEFAULT_MAX_ATTEMPTS};
use std::time::Duration;
use typed_builder::TypedBuilder;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// When click accounting runs relative to the redirect it belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClickAccounting {
    /// Spawned on the runtime; the redirect returns immediately.
    #[default]
    Detached,
    /// Awaited before the redirect returns.
    Inline,
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct ServiceConfig {
    /// Prefix of the public short URLs.
    #[builder(default = DEFAULT_BASE_URL.to_string(), setter(into))]
    pub base_url: String,
    #[builder(default = DEFAULT_CODE_LENGTH)]
    pub code_length: usize,
    #[builder(default = DEFAULT_MAX_ATTEMPTS)]
    pub max_generation_attempts: u32,
    /// Upper bound on any cache ttl. Records without expiry are cached this
    /// long; `None` caches them without expiry.
    #[builder(default = Some(Duration::from_secs(24 * 60 * 60)))]
    pub max_cache_ttl: Option<Duration>,
    /// How long a click waits for its counter lock.
    #[builder(default = Duration::from_millis(500))]
    pub lock_wait: Duration,
    #[builder(default)]
    pub click_accounting: ClickAccounting,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ServiceConfig {
    pub fn generator_settings(&self) -> GeneratorSettings {
        GeneratorSettings::builder()
            .code_length(self.code_length)
            .max_attempts(self.max_generation_attempts)
            .build()
    }
}
