use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required env var: {0}")]
    MissingEnv(String),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub chain: ChainConfig,
    pub data_source: DataSourceConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC HTTP endpoint
    pub rpc_url: String,
    /// Hex signing key - loaded from env PRIVATE_KEY
    #[serde(default)]
    pub private_key: String,
    /// Resolution oracle contract (commit / finalize entry points)
    pub oracle_address: String,
    /// Market factory contract (market registry)
    pub factory_address: String,
    /// Multiplier applied to estimated gas before submission.
    #[serde(default = "default_gas_multiplier")]
    pub gas_multiplier: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataSourceConfig {
    /// Metric / price API base URL
    pub base_url: String,
    #[serde(default = "default_data_source_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_webhook_host")]
    pub host: String,
    #[serde(default = "default_webhook_port")]
    pub port: u16,
    /// Shared HMAC secret - loaded from env WEBHOOK_SECRET. Empty disables
    /// signature verification.
    #[serde(default)]
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    /// Max concurrent resolutions, and max job starts per rate interval.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_rate_interval_ms")]
    pub rate_interval_ms: u64,
    /// Total attempts per job before giving up.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_gas_multiplier() -> f64 {
    1.2
}
fn default_data_source_timeout_ms() -> u64 {
    10_000
}
fn default_webhook_host() -> String {
    "0.0.0.0".to_string()
}
fn default_webhook_port() -> u16 {
    3001
}
fn default_batch_size() -> usize {
    5
}
fn default_rate_interval_ms() -> u64 {
    1000
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    5000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            host: default_webhook_host(),
            port: default_webhook_port(),
            secret: String::new(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            rate_interval_ms: default_rate_interval_ms(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl ResolverConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn rate_interval(&self) -> Duration {
        Duration::from_millis(self.rate_interval_ms)
    }
}

impl WebhookConfig {
    pub fn secret(&self) -> Option<&str> {
        if self.secret.is_empty() {
            None
        } else {
            Some(&self.secret)
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    /// Load config from a TOML file, then overlay environment variables for secrets.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        // Secrets never live in the config file
        if let Ok(key) = std::env::var("PRIVATE_KEY") {
            config.chain.private_key = key;
        }
        if let Ok(secret) = std::env::var("WEBHOOK_SECRET") {
            config.webhook.secret = secret;
        }

        Ok(config)
    }

    /// Build a config from environment variables only (no file needed).
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Config {
            chain: ChainConfig {
                rpc_url: std::env::var("RPC_URL").unwrap_or_default(),
                private_key: std::env::var("PRIVATE_KEY").unwrap_or_default(),
                oracle_address: std::env::var("ORACLE_ADDRESS").unwrap_or_default(),
                factory_address: std::env::var("FACTORY_ADDRESS").unwrap_or_default(),
                gas_multiplier: env_or("GAS_MULTIPLIER", default_gas_multiplier())?,
            },
            data_source: DataSourceConfig {
                base_url: std::env::var("DATA_SOURCE_URL").unwrap_or_default(),
                timeout_ms: env_or("DATA_SOURCE_TIMEOUT_MS", default_data_source_timeout_ms())?,
            },
            webhook: WebhookConfig {
                host: std::env::var("WEBHOOK_HOST").unwrap_or_else(|_| default_webhook_host()),
                port: env_or("WEBHOOK_PORT", default_webhook_port())?,
                secret: std::env::var("WEBHOOK_SECRET").unwrap_or_default(),
            },
            resolver: ResolverConfig {
                batch_size: env_or("BATCH_SIZE", default_batch_size())?,
                rate_interval_ms: env_or("RATE_INTERVAL_MS", default_rate_interval_ms())?,
                retry_attempts: env_or("RETRY_ATTEMPTS", default_retry_attempts())?,
                retry_delay_ms: env_or("RETRY_DELAY_MS", default_retry_delay_ms())?,
            },
            logging: LoggingConfig {
                level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| default_log_level()),
                json: env_or("LOG_JSON", false)?,
            },
        })
    }

    /// Check that everything needed to talk to the chain and the data source is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("RPC_URL", &self.chain.rpc_url),
            ("PRIVATE_KEY", &self.chain.private_key),
            ("ORACLE_ADDRESS", &self.chain.oracle_address),
            ("FACTORY_ADDRESS", &self.chain.factory_address),
            ("DATA_SOURCE_URL", &self.data_source.base_url),
        ];
        for (key, value) in required {
            if value.is_empty() {
                return Err(ConfigError::MissingEnv(key.to_string()));
            }
        }

        if self.resolver.batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "BATCH_SIZE".to_string(),
                value: "0".to_string(),
            });
        }
        if self.chain.gas_multiplier < 1.0 {
            return Err(ConfigError::Invalid {
                key: "GAS_MULTIPLIER".to_string(),
                value: self.chain.gas_multiplier.to_string(),
            });
        }

        Ok(())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: key.to_string(),
                value: raw,
            })
        }
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [chain]
        rpc_url = "http://localhost:8545"
        private_key = "0x01"
        oracle_address = "0x0000000000000000000000000000000000000001"
        factory_address = "0x0000000000000000000000000000000000000002"

        [data_source]
        base_url = "http://localhost:9000"
    "#;

    #[test]
    fn test_defaults_applied() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.resolver.batch_size, 5);
        assert_eq!(config.resolver.retry_attempts, 3);
        assert_eq!(config.resolver.retry_delay(), Duration::from_millis(5000));
        assert_eq!(config.webhook.port, 3001);
        assert_eq!(config.chain.gas_multiplier, 1.2);
        assert!(config.webhook.secret().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_reports_missing_key() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.chain.private_key.clear();
        match config.validate() {
            Err(ConfigError::MissingEnv(key)) => assert_eq!(key, "PRIVATE_KEY"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.resolver.batch_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }
}
