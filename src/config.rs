// Configuration management for the TWAP paper trader

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::types::Exchange;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub exchanges: ExchangesConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Shared token for protected routes; when absent every caller is authorized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangesConfig {
    #[serde(default = "default_binance")]
    pub binance: ExchangeConfig,
    #[serde(default = "default_kraken")]
    pub kraken: ExchangeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub ws_url: String,
    pub rest_url: String,
    /// Pairs subscribed as soon as the feed connects
    #[serde(default)]
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_backoff_initial")]
    pub backoff_initial_ms: u64,
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_backoff_jitter")]
    pub backoff_jitter: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum tick age still considered fresh for a slice
    #[serde(default = "default_staleness")]
    pub staleness_secs: f64,
    /// Lot size that slice quantities are floored to
    #[serde(default = "default_quantity_step")]
    pub quantity_step: f64,
    /// Orders that would need more slices than this are rejected
    #[serde(default = "default_max_slices")]
    pub max_slices: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub log_ticks: bool,
}

// Default value functions
fn default_bind() -> String { "0.0.0.0:8000".to_string() }
fn default_true() -> bool { true }
fn default_backoff_initial() -> u64 { 1_000 }
fn default_backoff_max() -> u64 { 30_000 }
fn default_backoff_multiplier() -> f64 { 2.0 }
fn default_backoff_jitter() -> f64 { 0.1 }
fn default_staleness() -> f64 { 10.0 }
fn default_quantity_step() -> f64 { 1.0 }
fn default_max_slices() -> usize { 10_000 }
fn default_subscriber_buffer() -> usize { 256 }
fn default_log_level() -> String { "info".to_string() }

fn default_binance() -> ExchangeConfig {
    ExchangeConfig {
        enabled: true,
        ws_url: "wss://stream.binance.com:9443/ws".to_string(),
        rest_url: "https://api.binance.com".to_string(),
        symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
    }
}

fn default_kraken() -> ExchangeConfig {
    ExchangeConfig {
        enabled: true,
        ws_url: "wss://ws.kraken.com".to_string(),
        rest_url: "https://api.kraken.com".to_string(),
        symbols: vec!["XBT/USD".to_string(), "ETH/USD".to_string()],
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind(), auth_token: None }
    }
}

impl Default for ExchangesConfig {
    fn default() -> Self {
        Self { binance: default_binance(), kraken: default_kraken() }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            backoff_initial_ms: default_backoff_initial(),
            backoff_max_ms: default_backoff_max(),
            backoff_multiplier: default_backoff_multiplier(),
            backoff_jitter: default_backoff_jitter(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            staleness_secs: default_staleness(),
            quantity_step: default_quantity_step(),
            max_slices: default_max_slices(),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self { subscriber_buffer: default_subscriber_buffer() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), log_ticks: false }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            exchanges: ExchangesConfig::default(),
            feed: FeedConfig::default(),
            scheduler: SchedulerConfig::default(),
            hub: HubConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ExchangesConfig {
    pub fn get(&self, exchange: Exchange) -> &ExchangeConfig {
        match exchange {
            Exchange::Binance => &self.binance,
            Exchange::Kraken => &self.kraken,
        }
    }

    /// Exchanges with `enabled = true`, in declaration order
    pub fn enabled(&self) -> Vec<Exchange> {
        Exchange::ALL
            .into_iter()
            .filter(|exchange| self.get(*exchange).enabled)
            .collect()
    }
}

impl SchedulerConfig {
    /// Saturates at `Duration::MAX`; `Config::validate` rejects values out of range
    pub fn staleness(&self) -> Duration {
        Duration::try_from_secs_f64(self.staleness_secs).unwrap_or(Duration::MAX)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(e.to_string()))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        fs::write(path, content)
            .map_err(|e| ConfigError::FileWrite(e.to_string()))?;

        Ok(())
    }

    /// Load configuration from file, or create default if file doesn't exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            let config = Self::default();
            config.to_file(&path)?;
            info!("Created default config file: {}", path.as_ref().display());
            Ok(config)
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.bind.trim().is_empty() {
            return Err(ConfigError::Validation("server.bind must not be empty".to_string()));
        }

        if self.exchanges.enabled().is_empty() {
            return Err(ConfigError::Validation("at least one exchange must be enabled".to_string()));
        }

        for exchange in self.exchanges.enabled() {
            let venue = self.exchanges.get(exchange);
            if venue.ws_url.is_empty() || venue.rest_url.is_empty() {
                return Err(ConfigError::Validation(format!("{} urls must not be empty", exchange)));
            }
        }

        if self.feed.backoff_initial_ms == 0 {
            return Err(ConfigError::Validation("backoff_initial_ms must be greater than 0".to_string()));
        }

        if self.feed.backoff_max_ms < self.feed.backoff_initial_ms {
            return Err(ConfigError::Validation("backoff_max_ms must be >= backoff_initial_ms".to_string()));
        }

        if self.feed.backoff_multiplier < 1.0 {
            return Err(ConfigError::Validation("backoff_multiplier must be at least 1.0".to_string()));
        }

        if !(0.0..1.0).contains(&self.feed.backoff_jitter) {
            return Err(ConfigError::Validation("backoff_jitter must be in [0, 1)".to_string()));
        }

        if self.scheduler.staleness_secs <= 0.0 || !self.scheduler.staleness_secs.is_finite() {
            return Err(ConfigError::Validation("staleness_secs must be positive".to_string()));
        }
        if Duration::try_from_secs_f64(self.scheduler.staleness_secs).is_err() {
            return Err(ConfigError::Validation(format!(
                "staleness_secs {} is too large",
                self.scheduler.staleness_secs
            )));
        }

        if self.scheduler.max_slices == 0 {
            return Err(ConfigError::Validation("max_slices must be greater than 0".to_string()));
        }

        if self.scheduler.quantity_step <= 0.0 || !self.scheduler.quantity_step.is_finite() {
            return Err(ConfigError::Validation("quantity_step must be positive".to_string()));
        }

        if self.hub.subscriber_buffer == 0 {
            return Err(ConfigError::Validation("subscriber_buffer must be greater than 0".to_string()));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(String),

    #[error("Failed to write config file: {0}")]
    FileWrite(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.exchanges.enabled(), vec![Exchange::Binance, Exchange::Kraken]);
        assert_eq!(config.scheduler.staleness(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            auth_token = "secret"

            [scheduler]
            staleness_secs = 2.5
            "#,
        )
        .unwrap();

        assert_eq!(config.server.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.server.bind, "0.0.0.0:8000");
        assert_eq!(config.scheduler.quantity_step, 1.0);
        assert_eq!(config.scheduler.staleness(), Duration::from_millis(2500));
        assert_eq!(config.exchanges.kraken.symbols, vec!["XBT/USD", "ETH/USD"]);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.hub.subscriber_buffer = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = Config::default();
        config.feed.backoff_max_ms = 10;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scheduler.quantity_step = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scheduler.max_slices = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.exchanges.binance.enabled = false;
        config.exchanges.kraken.enabled = false;
        assert!(config.validate().is_err());
    }
}
