//! Configuration for the payment engine runtime.

use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// CLI arguments for the payment engine.
#[derive(Parser, Debug)]
#[command(name = "agentpay-rs")]
#[command(about = "Agent payment engine speaking JSON-RPC over stdio")]
struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG")]
    config: Option<PathBuf>,
}

/// Runtime configuration.
///
/// Fields use serde defaults that fall back to environment variables,
/// then to hardcoded defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the programmable wallet provider API.
    #[serde(default = "config_defaults::default_provider_url")]
    provider_url: Url,
    /// API key sent as a bearer token on provider requests.
    #[serde(default = "config_defaults::default_provider_api_key")]
    provider_api_key: Option<String>,
    /// Upper bound on a single payment execution, in seconds.
    #[serde(default = "config_defaults::default_execute_timeout_secs")]
    execute_timeout_secs: u64,
    /// Timeout applied to outbound HTTP requests, in seconds.
    #[serde(default = "config_defaults::default_http_timeout_secs")]
    http_timeout_secs: u64,
    /// How many batch payments may be in flight at once.
    #[serde(default = "config_defaults::default_batch_concurrency")]
    batch_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            provider_url: config_defaults::default_provider_url(),
            provider_api_key: config_defaults::default_provider_api_key(),
            execute_timeout_secs: config_defaults::default_execute_timeout_secs(),
            http_timeout_secs: config_defaults::default_http_timeout_secs(),
            batch_concurrency: config_defaults::default_batch_concurrency(),
        }
    }
}

pub mod config_defaults {
    use std::env;
    use url::Url;

    pub const DEFAULT_PROVIDER_URL: &str = "http://127.0.0.1:8899/";
    pub const DEFAULT_EXECUTE_TIMEOUT_SECS: u64 = 120;
    pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_BATCH_CONCURRENCY: usize = 5;

    /// Returns the provider URL with fallback: $WALLET_PROVIDER_URL env var -> local default
    pub fn default_provider_url() -> Url {
        env::var("WALLET_PROVIDER_URL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| Url::parse(DEFAULT_PROVIDER_URL).unwrap())
    }

    /// Returns the provider API key from the $WALLET_PROVIDER_API_KEY env var, if set
    pub fn default_provider_api_key() -> Option<String> {
        env::var("WALLET_PROVIDER_API_KEY").ok()
    }

    /// Returns the execution timeout with fallback: $PAYMENT_TIMEOUT_SECS env var -> 120
    pub fn default_execute_timeout_secs() -> u64 {
        env::var("PAYMENT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_EXECUTE_TIMEOUT_SECS)
    }

    /// Returns the HTTP timeout with fallback: $HTTP_TIMEOUT_SECS env var -> 30
    pub fn default_http_timeout_secs() -> u64 {
        env::var("HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS)
    }

    /// Returns the batch concurrency with fallback: $BATCH_CONCURRENCY env var -> 5
    pub fn default_batch_concurrency() -> usize {
        env::var("BATCH_CONCURRENCY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_BATCH_CONCURRENCY)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl Config {
    /// Get the wallet provider base URL.
    pub fn provider_url(&self) -> &Url {
        &self.provider_url
    }

    /// Get the wallet provider API key, if configured.
    pub fn provider_api_key(&self) -> Option<&str> {
        self.provider_api_key.as_deref()
    }

    /// Get the per-payment execution timeout.
    pub fn execute_timeout(&self) -> Duration {
        Duration::from_secs(self.execute_timeout_secs)
    }

    /// Get the outbound HTTP timeout.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Get the batch concurrency limit.
    pub fn batch_concurrency(&self) -> usize {
        self.batch_concurrency
    }

    /// Load configuration from CLI arguments and JSON file.
    ///
    /// The config file path is determined by:
    /// 1. `--config <path>` CLI argument (must exist if given)
    /// 2. `./config.json` (if it exists)
    /// 3. Built-in defaults otherwise
    ///
    /// Values not present in the config file will be resolved via
    /// environment variables or defaults during deserialization.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        match cli_args.config {
            Some(path) => {
                let config_path = Path::new(&path)
                    .canonicalize()
                    .map_err(|e| ConfigError::FileRead(path, e))?;
                Self::load_from_path(config_path)
            }
            None => {
                let fallback = Path::new("config.json");
                if fallback.exists() {
                    Self::load_from_path(fallback.to_path_buf())
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load configuration from a specific path.
    fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }
}
