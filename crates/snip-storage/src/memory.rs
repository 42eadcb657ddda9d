use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use snip_core::repository::{
    AccessLog, AccessLogRepository, ReadRepository, Repository, Result, ShortUrlRecord,
};
use snip_core::{ShortCode, StorageError};

/// A process-local store for tests and single-node runs.
///
/// Records are keyed by the rendered code. Inserts never overwrite, expired
/// rows included.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    records: DashMap<String, ShortUrlRecord>,
    access_logs: Mutex<Vec<AccessLog>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// A snapshot of every access log recorded so far, oldest first.
    pub fn access_logs(&self) -> Vec<AccessLog> {
        self.access_logs.lock().clone()
    }
}

#[async_trait]
impl ReadRepository for InMemoryRepository {
    async fn get(&self, code: &ShortCode) -> Result<Option<ShortUrlRecord>> {
        Ok(self.records.get(code.as_str()).map(|r| r.value().clone()))
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn insert(&self, record: ShortUrlRecord) -> Result<()> {
        match self.records.entry(record.code.as_str().to_string()) {
            Entry::Occupied(_) => Err(StorageError::Conflict(record.code.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn update_click_count(&self, code: &ShortCode, click_count: u64) -> Result<()> {
        match self.records.get_mut(code.as_str()) {
            Some(mut record) => {
                record.click_count = click_count;
                Ok(())
            }
            None => Err(StorageError::NotFound(code.to_string())),
        }
    }
}

#[async_trait]
impl AccessLogRepository for InMemoryRepository {
    async fn record_access(&self, log: AccessLog) -> Result<()> {
        self.access_logs.lock().push(log);
        Ok(())
    }
}
