mod cli;

use crate::cli::{CacheBackendArg, Cli, Command, LogFormat, StorageBackendArg};
use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use snip_cache::{
    BloomCollisionFilter, BloomFilterConfig, LocalLock, MokaUrlCache, RedisBloomFilter, RedisLock,
    RedisUrlCache,
};
use snip_core::{
    AccessLogRepository, CollisionFilter, DistributedLock, Repository, ShortCode, UrlCache, Visit,
};
use snip_service::{
    ClickAccounting, ExpirationPolicy, Resolution, ResolutionService, ServiceConfig, ShortenParams,
};
use snip_storage::{InMemoryRepository, MySqlRepository};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize)]
struct ShortenOutput {
    code: String,
    short_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum ResolveStatus {
    Found,
    NotFound,
    Expired,
}

#[derive(Debug, Serialize)]
struct ResolveOutput {
    code: String,
    status: ResolveStatus,
    long_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    info!(
        storage_backend = %cli.storage,
        cache_backend = %cli.cache,
        base_url = %cli.base_url,
        "starting snip"
    );
    if cli.looks_up_ephemeral_store() {
        warn!("In-memory storage starts empty, codes from earlier runs will not be found");
    }

    match cli.storage {
        StorageBackendArg::InMemory => with_storage(&cli, InMemoryRepository::new()).await,
        StorageBackendArg::Mysql => {
            let dsn = cli
                .mysql_dsn
                .as_deref()
                .context("mysql dsn is required when storage backend is mysql")?;
            let repository = MySqlRepository::connect(dsn, cli.mysql_max_connections).await?;
            repository.migrate().await?;
            with_storage(&cli, repository).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn with_storage<R>(cli: &Cli, repository: R) -> anyhow::Result<()>
where
    R: Repository + AccessLogRepository,
{
    let repository = Arc::new(repository);
    let filter_config = BloomFilterConfig::builder()
        .expected_items(cli.filter_expected_items)
        .false_positive_rate(cli.filter_false_positive_rate)
        .build();

    match cli.cache {
        CacheBackendArg::InMemory => {
            let service = ResolutionService::new(
                repository,
                Arc::new(MokaUrlCache::new()),
                Arc::new(BloomCollisionFilter::new(filter_config)?),
                Arc::new(LocalLock::new()),
                service_config(cli),
            );
            execute(&service, &cli.command).await
        }
        CacheBackendArg::Redis => {
            let url = cli
                .redis_url
                .as_deref()
                .context("redis url is required when cache backend is redis")?;
            let conn = redis::Client::open(url)?
                .get_multiplexed_async_connection()
                .await
                .context("failed to connect to redis")?;

            let service = ResolutionService::new(
                repository,
                Arc::new(RedisUrlCache::new(conn.clone())),
                Arc::new(RedisBloomFilter::new(conn.clone(), filter_config)?),
                Arc::new(RedisLock::new(conn)),
                service_config(cli),
            );
            execute(&service, &cli.command).await
        }
    }
}

// One-shot process: detached accounting would be lost on exit.
fn service_config(cli: &Cli) -> ServiceConfig {
    ServiceConfig::builder()
        .base_url(cli.base_url.clone())
        .click_accounting(ClickAccounting::Inline)
        .build()
}

async fn execute<R, C, F, L>(
    service: &ResolutionService<R, C, F, L>,
    command: &Command,
) -> anyhow::Result<()>
where
    R: Repository + AccessLogRepository,
    C: UrlCache,
    F: CollisionFilter,
    L: DistributedLock,
{
    match command {
        Command::Shorten {
            url,
            alias,
            expires_in,
            expires_at,
        } => {
            let expiration = match (expires_in, expires_at) {
                (Some(seconds), _) => ExpirationPolicy::AfterDuration(Duration::from_secs(*seconds)),
                (None, Some(timestamp)) => ExpirationPolicy::AtTimestamp(*timestamp),
                (None, None) => ExpirationPolicy::Never,
            };
            let mut params = ShortenParams::new(url.clone()).with_expiration(expiration);
            if let Some(alias) = alias {
                params = params.with_alias(alias.clone());
            }

            let code = service.shorten(params).await?;
            print_json(&ShortenOutput {
                short_url: service.short_url(&code),
                code: code.to_string(),
            })
        }
        Command::Resolve {
            code,
            user_ip,
            user_agent,
        } => {
            let short_code = ShortCode::new(code.clone())?;
            let visit = Visit {
                user_ip: user_ip.clone(),
                user_agent: user_agent.clone(),
            };
            let (status, long_url) = match service.resolve_visit(&short_code, visit).await? {
                Resolution::Found(url) => (ResolveStatus::Found, Some(url)),
                Resolution::NotFound => (ResolveStatus::NotFound, None),
                Resolution::Expired => (ResolveStatus::Expired, None),
            };
            print_json(&ResolveOutput {
                code: code.clone(),
                status,
                long_url,
            })
        }
        Command::Stats { code } => {
            let short_code = ShortCode::new(code.clone())?;
            let record = service
                .stats(&short_code)
                .await?
                .with_context(|| format!("short code not found: {code}"))?;
            print_json(&record)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
