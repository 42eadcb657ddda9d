//! Durable store gateways for short URL records and access logs.

pub mod memory;
pub mod mysql;

pub use memory::InMemoryRepository;
pub use mysql::{MySqlRepository, MYSQL_SCHEMA};
pub use snip_core::repository::{
    AccessLog, AccessLogRepository, ReadRepository, Repository, ShortUrlRecord,
};
pub use snip_core::StorageError;
