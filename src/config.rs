//! Configuration types for dispersion-monitor

use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

/// Minimum poll interval; shorter values are clamped up
pub const MIN_POLL_INTERVAL_SECS: u64 = 1;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub portfolio: PortfolioConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Broker API configuration
///
/// Credentials are optional: when either is absent the monitor runs
/// entirely on synthetic data.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
}

fn default_api_base_url() -> String {
    "https://api.kite.trade".to_string()
}
fn default_ws_url() -> String {
    "wss://ws.kite.trade".to_string()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            access_token: None,
            api_base_url: default_api_base_url(),
            ws_url: default_ws_url(),
        }
    }
}

impl BrokerConfig {
    /// Trimmed, non-empty credentials, if both are configured
    pub fn credentials(&self) -> Option<(String, String)> {
        let key = self.api_key.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let token = self
            .access_token
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())?;
        Some((key.to_string(), token.to_string()))
    }
}

/// Reference portfolio configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioConfig {
    /// Target cash value the position basket is sized to represent
    #[serde(default = "default_reference_value")]
    pub reference_value: Decimal,
}

fn default_reference_value() -> Decimal {
    Decimal::from(60_000_000u64)
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            reference_value: default_reference_value(),
        }
    }
}

/// Pull poller configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    /// Seconds between fetch-all passes (minimum 1)
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,

    /// Maximum concurrent per-instrument fetches
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Per-fetch timeout in milliseconds
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

fn default_poll_interval_secs() -> u64 {
    4
}
fn default_worker_pool_size() -> usize {
    10
}
fn default_fetch_timeout_ms() -> u64 {
    3000
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
            worker_pool_size: default_worker_pool_size(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
        }
    }
}

impl PollingConfig {
    /// Poll interval clamped to the minimum
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(MIN_POLL_INTERVAL_SECS))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// Push feed (re)connect configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    /// Connect attempts before giving up and falling back to polling
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,

    /// Delay between connect attempts in seconds
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

fn default_reconnect_attempts() -> u32 {
    5
}
fn default_reconnect_delay_secs() -> u64 {
    5
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

impl PushConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

/// Snapshot cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Maximum age a cached snapshot may be served at, in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_cache_ttl_secs() -> u64 {
    2
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
