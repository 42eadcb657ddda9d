//! Short code generation.
//!
//! A code is the leading base-62 digits of the SHA-256 digest of the long
//! URL. Identical URLs therefore map to the same first candidate on every
//! instance. When the shared collision filter reports the candidate as
//! probably taken, the URL is re-hashed with a fresh salt.

pub mod hasher;
pub mod salt;

pub use hasher::{Hasher, Sha256Hasher};
pub use salt::{NanoSalt, SaltSource, SequentialSalt};

use snip_core::{CollisionFilter, ShortCode, ShortCodeBase62};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace, warn};
use typed_builder::TypedBuilder;

pub const DEFAULT_CODE_LENGTH: usize = 7;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerateError {
    #[error("no free short code after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

impl GenerateError {
    /// Exhaustion is transient: later salts or a drained filter may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerateError::Exhausted { .. } => true,
        }
    }
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct GeneratorSettings {
    /// Number of base-62 characters kept from the digest.
    #[builder(default = DEFAULT_CODE_LENGTH)]
    pub code_length: usize,
    /// Candidates tried before giving up.
    #[builder(default = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Derives short codes from content hashes, consulting a collision filter.
pub struct HashGenerator<F, H = Sha256Hasher, S = NanoSalt> {
    filter: Arc<F>,
    hasher: H,
    salt: S,
    settings: GeneratorSettings,
}

impl<F: CollisionFilter> HashGenerator<F> {
    pub fn new(filter: Arc<F>) -> Self {
        Self::with_parts(
            filter,
            Sha256Hasher,
            NanoSalt::new(),
            GeneratorSettings::default(),
        )
    }

    pub fn with_settings(filter: Arc<F>, settings: GeneratorSettings) -> Self {
        Self::with_parts(filter, Sha256Hasher, NanoSalt::new(), settings)
    }
}

impl<F, H, S> HashGenerator<F, H, S>
where
    F: CollisionFilter,
    H: Hasher,
    S: SaltSource,
{
    pub fn with_parts(filter: Arc<F>, hasher: H, salt: S, settings: GeneratorSettings) -> Self {
        Self {
            filter,
            hasher,
            salt,
            settings,
        }
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    /// The first candidate for `long_url`, without consulting the filter.
    pub fn candidate(&self, long_url: &str) -> ShortCode {
        self.derive(long_url.as_bytes())
    }

    /// Produces a code the filter has not seen and records it in the filter.
    ///
    /// The returned code is only probably free: the durable store insert
    /// decides.
    pub async fn generate(&self, long_url: &str) -> Result<ShortCode, GenerateError> {
        let max_attempts = self.settings.max_attempts;
        let mut candidate = self.candidate(long_url);

        for attempt in 1..=max_attempts {
            if !self.probably_taken(&candidate).await {
                if let Err(e) = self.filter.add(&candidate).await {
                    warn!(code = %candidate, error = %e, "failed to add code to collision filter");
                }
                trace!(code = %candidate, attempt, "generated short code");
                return Ok(candidate);
            }

            debug!(code = %candidate, attempt, "probable short code collision, re-salting");
            let salted = format!("{}{}", long_url, self.salt.next_salt());
            candidate = self.derive(salted.as_bytes());
        }

        warn!(attempts = max_attempts, "short code generation exhausted");
        Err(GenerateError::Exhausted {
            attempts: max_attempts,
        })
    }

    fn derive(&self, input: &[u8]) -> ShortCode {
        let digest = self.hasher.digest(input);
        ShortCode::generated(ShortCodeBase62::from_digest(digest, self.settings.code_length))
    }

    // A filter that cannot answer is treated as "absent".
    async fn probably_taken(&self, code: &ShortCode) -> bool {
        match self.filter.might_contain(code).await {
            Ok(present) => present,
            Err(e) => {
                warn!(code = %code, error = %e, "collision filter lookup failed, assuming absent");
                false
            }
        }
    }
}
