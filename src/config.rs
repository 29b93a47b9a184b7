use std::str::FromStr;
use std::time::Duration;

use crate::processing::ProcessorConfig;

// ============================================================================
// Configuration
// ============================================================================
//
// Read from environment variables; `main` loads `.env` first via dotenvy.
// Only DATABASE_URL is required. A variable that is set but unparsable is an
// error rather than a silent fallback to the default.
//
// ============================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaConfig {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub redis_url: String,
    pub cache_ttl: Duration,
    pub cache_warmup_limit: i64,
    pub cache_read_through: bool,
    pub kafka: KafkaConfig,
    pub processor: ProcessorConfig,
    pub http_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let string = |name: &'static str, default: &str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        Ok(Self {
            database_url,
            database_max_connections: parse(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            redis_url: string("REDIS_URL", "redis://127.0.0.1:6379"),
            cache_ttl: Duration::from_secs(parse(&lookup, "CACHE_TTL_SECS", 3600)?),
            cache_warmup_limit: parse_positive(&lookup, "CACHE_WARMUP_LIMIT", 1000)?,
            cache_read_through: parse(&lookup, "CACHE_READ_THROUGH", false)?,
            kafka: KafkaConfig {
                brokers: string("KAFKA_BROKERS", "127.0.0.1:9092"),
                topic: string("KAFKA_TOPIC", "order_created"),
                group_id: string("KAFKA_GROUP_ID", "orders-inbox"),
            },
            processor: ProcessorConfig {
                batch_size: parse_positive(&lookup, "INBOX_BATCH_SIZE", 10)?,
                poll_interval: Duration::from_millis(parse(&lookup, "INBOX_POLL_INTERVAL_MS", 2000)?),
                max_attempts: parse_positive(&lookup, "INBOX_MAX_ATTEMPTS", 5)?,
                lease: Duration::from_secs(parse(&lookup, "INBOX_LEASE_SECS", 30)?),
            },
            http_port: parse(&lookup, "HTTP_PORT", 8081)?,
        })
    }
}

/// Settings for the `order_generator` binary. It needs no database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    pub brokers: String,
    pub topic: String,
    pub interval: Duration,
}

impl GeneratorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let string = |name: &'static str, default: &str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            brokers: string("KAFKA_BROKERS", "127.0.0.1:9092"),
            topic: string("KAFKA_TOPIC", "order_created"),
            interval: Duration::from_secs(parse_positive(&lookup, "GENERATOR_INTERVAL_SECS", 60u64)?),
        })
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name).filter(|v| !v.trim().is_empty()) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

/// Like [`parse`], but the value must be at least 1.
fn parse_positive<T: FromStr + PartialOrd + From<u8> + ToString>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    let value = parse(lookup, name, default)?;
    if value < T::from(1) {
        return Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        });
    }
    Ok(value)
}
