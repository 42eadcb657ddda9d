use crate::error::StorageError;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, StorageError>;

/// The authoritative record for a short code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortUrlRecord {
    pub code: ShortCode,
    pub long_url: String,
    pub created_at: Timestamp,
    /// When the record expires, if ever.
    pub expires_at: Option<Timestamp>,
    pub click_count: u64,
}

impl ShortUrlRecord {
    /// A fresh record created now with no clicks.
    pub fn new(code: ShortCode, long_url: impl Into<String>, expires_at: Option<Timestamp>) -> Self {
        Self {
            code,
            long_url: long_url.into(),
            created_at: Timestamp::now(),
            expires_at,
            click_count: 0,
        }
    }

    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

/// Request metadata attached to a resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Visit {
    pub user_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// One successful resolution of a short code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessLog {
    pub code: ShortCode,
    pub clicked_at: Timestamp,
    pub user_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl AccessLog {
    pub fn new(code: ShortCode, visit: Visit) -> Self {
        Self {
            code,
            clicked_at: Timestamp::now(),
            user_ip: visit.user_ip,
            user_agent: visit.user_agent,
        }
    }
}

/// A read-only view of the durable store.
#[async_trait]
pub trait ReadRepository: Send + Sync + 'static {
    /// Retrieves the record for a code, expired or not.
    /// Returns `None` if the code does not exist.
    async fn get(&self, code: &ShortCode) -> Result<Option<ShortUrlRecord>>;
}

#[async_trait]
pub trait Repository: ReadRepository {
    /// Inserts a new record. Returns `Err(Conflict)` if the code already exists.
    async fn insert(&self, record: ShortUrlRecord) -> Result<()>;

    /// Overwrites the click count of an existing record.
    /// Returns `Err(NotFound)` if the code does not exist.
    async fn update_click_count(&self, code: &ShortCode, click_count: u64) -> Result<()>;

    /// Read-modify-write of the click count, returning the new value.
    ///
    /// Not atomic: concurrent callers for the same code must hold the
    /// code's counter lock or updates can be lost.
    async fn increment_click_count(&self, code: &ShortCode) -> Result<u64> {
        let record = self
            .get(code)
            .await?
            .ok_or_else(|| StorageError::NotFound(code.to_string()))?;
        let next = record.click_count.saturating_add(1);
        self.update_click_count(code, next).await?;
        Ok(next)
    }
}

/// Append-only store of access logs.
#[async_trait]
pub trait AccessLogRepository: Send + Sync + 'static {
    async fn record_access(&self, log: AccessLog) -> Result<()>;
}
