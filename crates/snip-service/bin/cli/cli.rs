use clap::{Parser, Subcommand, ValueEnum};
use jiff::Timestamp;
use snip_service::config::DEFAULT_BASE_URL;
use std::fmt::{Display, Formatter};

pub const STORAGE_BACKEND_ENV: &str = "SNIP_STORAGE_BACKEND";
pub const MYSQL_DSN_ENV: &str = "SNIP_MYSQL_DSN";
pub const MYSQL_MAX_CONNECTIONS_ENV: &str = "SNIP_MYSQL_MAX_CONNECTIONS";
pub const CACHE_BACKEND_ENV: &str = "SNIP_CACHE_BACKEND";
pub const REDIS_URL_ENV: &str = "SNIP_REDIS_URL";
pub const BASE_URL_ENV: &str = "SNIP_BASE_URL";
pub const FILTER_EXPECTED_ITEMS_ENV: &str = "SNIP_FILTER_EXPECTED_ITEMS";
pub const FILTER_FALSE_POSITIVE_RATE_ENV: &str = "SNIP_FILTER_FALSE_POSITIVE_RATE";
pub const LOG_FORMAT_ENV: &str = "SNIP_LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "mysql")]
    Mysql,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::InMemory => write!(f, "in-memory"),
            StorageBackendArg::Mysql => write!(f, "mysql"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "redis")]
    Redis,
}

impl Display for CacheBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheBackendArg::InMemory => write!(f, "in-memory"),
            CacheBackendArg::Redis => write!(f, "redis"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "snip", version, about = "Create and resolve short URLs")]
pub struct Cli {
    /// Durable store of the records.
    ///
    /// `in-memory` lives only for this one invocation, so `resolve` and
    /// `stats` can only see codes created by the same process. Use `mysql`
    /// to look up codes across invocations.
    #[arg(
        long,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::InMemory
    )]
    pub storage: StorageBackendArg,

    #[arg(long, env = MYSQL_DSN_ENV, required_if_eq("storage", "mysql"))]
    pub mysql_dsn: Option<String>,

    #[arg(long, env = MYSQL_MAX_CONNECTIONS_ENV, default_value_t = 5)]
    pub mysql_max_connections: u32,

    /// Backend of the resolution cache, collision filter and counter lock.
    #[arg(
        long,
        env = CACHE_BACKEND_ENV,
        value_enum,
        default_value_t = CacheBackendArg::InMemory
    )]
    pub cache: CacheBackendArg,

    #[arg(long, env = REDIS_URL_ENV, required_if_eq("cache", "redis"))]
    pub redis_url: Option<String>,

    #[arg(long, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    #[arg(long, env = FILTER_EXPECTED_ITEMS_ENV, default_value_t = 1_000_000)]
    pub filter_expected_items: usize,

    #[arg(long, env = FILTER_FALSE_POSITIVE_RATE_ENV, default_value_t = 0.01)]
    pub filter_false_positive_rate: f64,

    #[arg(long, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Whether the command looks codes up in a store that starts out empty.
    pub fn looks_up_ephemeral_store(&self) -> bool {
        self.storage == StorageBackendArg::InMemory
            && matches!(self.command, Command::Resolve { .. } | Command::Stats { .. })
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a short URL.
    Shorten {
        url: String,
        /// Use this code instead of a generated one.
        #[arg(long)]
        alias: Option<String>,
        /// Expire this many seconds from now.
        #[arg(long, conflicts_with = "expires_at")]
        expires_in: Option<u64>,
        /// Expire at this RFC 3339 instant.
        #[arg(long)]
        expires_at: Option<Timestamp>,
    },
    /// Print the long URL behind a code and count the click.
    Resolve {
        code: String,
        #[arg(long)]
        user_ip: Option<String>,
        #[arg(long)]
        user_agent: Option<String>,
    },
    /// Print the stored record of a code.
    Stats { code: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["snip", "stats", "abc123"]).unwrap();
        assert_eq!(cli.storage, StorageBackendArg::InMemory);
        assert_eq!(cli.cache, CacheBackendArg::InMemory);
        assert_eq!(cli.base_url, "http://localhost:8080");
        assert_eq!(cli.filter_expected_items, 1_000_000);
        assert!(matches!(cli.command, Command::Stats { code } if code == "abc123"));
    }

    #[test]
    fn lookups_against_in_memory_storage_are_flagged() {
        let stats = Cli::try_parse_from(["snip", "stats", "abc123"]).unwrap();
        assert!(stats.looks_up_ephemeral_store());

        let resolve = Cli::try_parse_from(["snip", "resolve", "abc123"]).unwrap();
        assert!(resolve.looks_up_ephemeral_store());

        let shorten = Cli::try_parse_from(["snip", "shorten", "https://a.io"]).unwrap();
        assert!(!shorten.looks_up_ephemeral_store());

        let mysql = Cli::try_parse_from([
            "snip",
            "--storage",
            "mysql",
            "--mysql-dsn",
            "mysql://root@localhost/snip",
            "stats",
            "abc123",
        ])
        .unwrap();
        assert!(!mysql.looks_up_ephemeral_store());
    }

    #[test]
    fn mysql_requires_dsn() {
        let result = Cli::try_parse_from(["snip", "--storage", "mysql", "stats", "abc123"]);
        assert!(result.is_err());
    }

    #[test]
    fn redis_requires_url() {
        let result = Cli::try_parse_from(["snip", "--cache", "redis", "stats", "abc123"]);
        assert!(result.is_err());
    }

    #[test]
    fn expiry_flags_conflict() {
        let result = Cli::try_parse_from([
            "snip",
            "shorten",
            "https://a.io",
            "--expires-in",
            "60",
            "--expires-at",
            "2030-01-01T00:00:00Z",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn shorten_with_alias_and_deadline() {
        let cli = Cli::try_parse_from([
            "snip",
            "shorten",
            "https://a.io",
            "--alias",
            "promo1",
            "--expires-at",
            "2030-01-01T00:00:00Z",
        ])
        .unwrap();

        match cli.command {
            Command::Shorten {
                url,
                alias,
                expires_in,
                expires_at,
            } => {
                assert_eq!(url, "https://a.io");
                assert_eq!(alias.as_deref(), Some("promo1"));
                assert_eq!(expires_in, None);
                assert_eq!(expires_at.unwrap().as_second(), 1_893_456_000);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
