//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use bridge::{ApiClientConfig, BrokerSettings};
use domain::{DEFAULT_HIGH_VALUE_THRESHOLD, Money, ValidationSettings};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` / `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info,tower_http=debug`)
/// - `LOG_FORMAT`: `text` or `json`
/// - `DATABASE_URL`: PostgreSQL connection string; the in-memory store is used when unset
/// - `CATALOG_PATH`: JSON seed with customers, products, suppliers and inventory
/// - `INTERNAL_API_URL`: processing endpoint base URL; orders are processed in-process when unset
/// - `INTERNAL_API_TIMEOUT_SECS`, `WORKER_CONCURRENCY`, `MAX_DELIVERY_COUNT`, `MESSAGE_TTL_SECS`
/// - `MESSAGE_LOCK_SECS`: how long a worker may hold a message before it is redelivered
/// - `BROKER_RECORD_PUBLISHED`: `true` keeps every published message in memory for inspection
/// - `HIGH_VALUE_THRESHOLD`, `MAX_ORDER_VALUE`, `MAX_ITEMS_PER_ORDER`
///
/// Unparseable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub catalog_path: Option<PathBuf>,
    pub internal_api_url: Option<String>,
    pub internal_api_timeout: Duration,
    pub worker_concurrency: usize,
    pub max_delivery_count: u32,
    pub message_ttl: Duration,
    pub message_lock: Duration,
    pub record_published: bool,
    pub high_value_threshold: Money,
    pub max_order_value: Money,
    pub max_items_per_order: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parsed = |key: &str| text(key).and_then(|v| v.trim().parse::<u64>().ok());
        let dollars = |key: &str| {
            text(key)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map(Money::from_decimal)
        };

        Self {
            host: text("HOST").unwrap_or(defaults.host),
            port: text("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: text("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: text("LOG_FORMAT")
                .and_then(|f| f.parse().ok())
                .unwrap_or(defaults.log_format),
            database_url: text("DATABASE_URL"),
            catalog_path: text("CATALOG_PATH").map(PathBuf::from),
            internal_api_url: text("INTERNAL_API_URL"),
            internal_api_timeout: parsed("INTERNAL_API_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.internal_api_timeout),
            worker_concurrency: parsed("WORKER_CONCURRENCY")
                .and_then(|n| usize::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.worker_concurrency),
            max_delivery_count: parsed("MAX_DELIVERY_COUNT")
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_delivery_count),
            message_ttl: parsed("MESSAGE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.message_ttl),
            message_lock: parsed("MESSAGE_LOCK_SECS")
                .filter(|n| *n > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.message_lock),
            record_published: text("BROKER_RECORD_PUBLISHED")
                .and_then(|v| v.trim().to_ascii_lowercase().parse().ok())
                .unwrap_or(defaults.record_published),
            high_value_threshold: dollars("HIGH_VALUE_THRESHOLD")
                .unwrap_or(defaults.high_value_threshold),
            max_order_value: dollars("MAX_ORDER_VALUE").unwrap_or(defaults.max_order_value),
            max_items_per_order: parsed("MAX_ITEMS_PER_ORDER")
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(defaults.max_items_per_order),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn broker_settings(&self) -> BrokerSettings {
        BrokerSettings {
            max_delivery_count: self.max_delivery_count,
            message_ttl: self.message_ttl,
            lock_duration: self.message_lock,
            record_published: self.record_published,
            ..BrokerSettings::default()
        }
    }

    pub fn validation_settings(&self) -> ValidationSettings {
        ValidationSettings {
            max_order_value: self.max_order_value,
            max_items_per_order: self.max_items_per_order,
            ..ValidationSettings::default()
        }
    }

    /// Client settings for the processing endpoint, if one is configured.
    pub fn api_client_config(&self) -> Option<ApiClientConfig> {
        self.internal_api_url.as_ref().map(|url| ApiClientConfig {
            base_url: url.trim_end_matches('/').to_string(),
            timeout: self.internal_api_timeout,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        let validation = ValidationSettings::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info,tower_http=debug".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            catalog_path: None,
            internal_api_url: None,
            internal_api_timeout: Duration::from_secs(30),
            worker_concurrency: 4,
            max_delivery_count: BrokerSettings::default().max_delivery_count,
            message_ttl: BrokerSettings::default().message_ttl,
            message_lock: BrokerSettings::default().lock_duration,
            record_published: false,
            high_value_threshold: DEFAULT_HIGH_VALUE_THRESHOLD,
            max_order_value: validation.max_order_value,
            max_items_per_order: validation.max_items_per_order,
        }
    }
}
