use async_trait::async_trait;
use jiff::Timestamp;
use snip_core::repository::{
    AccessLog, AccessLogRepository, ReadRepository, Repository, Result, ShortUrlRecord,
};
use snip_core::{ShortCode, StorageError};
use sqlx::mysql::{MySqlPoolOptions, MySqlRow};
use sqlx::{MySqlPool, Row};
use tracing::{debug, info};

/// Table definitions, one statement each, in creation order.
pub const MYSQL_SCHEMA: &[&str] = &[
    include_str!("../ddl/mysql/urls.sql"),
    include_str!("../ddl/mysql/url_analytics.sql"),
];

/// MySQL implementation of the repository contract.
///
/// Timestamps are stored as unix milliseconds. `get` returns expired rows
/// as-is and inserts never reuse an existing code, expired or not.
#[derive(Debug, Clone)]
pub struct MySqlRepository {
    pool: MySqlPool,
}

impl MySqlRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Opens a new pool of at most `max_connections` connections.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Creates the tables if they do not exist yet.
    pub async fn migrate(&self) -> Result<()> {
        for statement in MYSQL_SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        }
        info!("MySQL schema is up to date");
        Ok(())
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    async fn exists(&self, code: &ShortCode) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM urls WHERE short_code = ? LIMIT 1")
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.is_some())
    }
}

fn parse_millis(column: &str, millis: i64) -> Result<Timestamp> {
    Timestamp::from_millisecond(millis).map_err(|e| {
        StorageError::InvalidData(format!("invalid {column} timestamp '{millis}': {e}"))
    })
}

fn record_from_row(row: &MySqlRow) -> Result<ShortUrlRecord> {
    let code: String = row.try_get("short_code").map_err(map_sqlx_error)?;
    let long_url: String = row.try_get("long_url").map_err(map_sqlx_error)?;
    let created_at: i64 = row.try_get("created_at").map_err(map_sqlx_error)?;
    let expires_at: Option<i64> = row.try_get("expires_at").map_err(map_sqlx_error)?;
    let click_count: u64 = row.try_get("click_count").map_err(map_sqlx_error)?;

    Ok(ShortUrlRecord {
        code: ShortCode::new_unchecked(code),
        long_url,
        created_at: parse_millis("created_at", created_at)?,
        expires_at: expires_at
            .map(|millis| parse_millis("expires_at", millis))
            .transpose()?,
        click_count,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

#[async_trait]
impl ReadRepository for MySqlRepository {
    async fn get(&self, code: &ShortCode) -> Result<Option<ShortUrlRecord>> {
        let row = sqlx::query(
            r#"
            SELECT short_code, long_url, created_at, expires_at, click_count
            FROM urls
            WHERE short_code = ?
            LIMIT 1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(record_from_row).transpose()
    }
}

#[async_trait]
impl Repository for MySqlRepository {
    async fn insert(&self, record: ShortUrlRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO urls (short_code, long_url, created_at, expires_at, click_count)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.code.as_str())
        .bind(&record.long_url)
        .bind(record.created_at.as_millisecond())
        .bind(record.expires_at.map(|ts| ts.as_millisecond()))
        .bind(record.click_count)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(code = %record.code, "Inserted short URL record");
                Ok(())
            }
            Err(err) if is_unique_violation(&err) => {
                Err(StorageError::Conflict(record.code.to_string()))
            }
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn update_click_count(&self, code: &ShortCode, click_count: u64) -> Result<()> {
        let result = sqlx::query("UPDATE urls SET click_count = ? WHERE short_code = ?")
            .bind(click_count)
            .bind(code.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        // MySQL reports zero affected rows when the value is unchanged.
        if result.rows_affected() == 0 && !self.exists(code).await? {
            return Err(StorageError::NotFound(code.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AccessLogRepository for MySqlRepository {
    async fn record_access(&self, log: AccessLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO url_analytics (short_code, clicked_at, user_ip, user_agent)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(log.code.as_str())
        .bind(log.clicked_at.as_millisecond())
        .bind(log.user_ip.as_deref())
        .bind(log.user_agent.as_deref())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }
}
