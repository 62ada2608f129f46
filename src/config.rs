// Configuration management for the trade bot

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub account_name: String,
    pub password: String,
    /// Two-factor shared secret (code generation is delegated to the session
    /// provider).
    pub shared_secret: String,
    /// Identity secret used to produce mobile-confirmation proofs.
    pub identity_secret: String,
    pub api_key: String,
    /// SteamID64 of the bot account.
    pub steam_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    pub app_id: u32,
    pub context_id: u64,
    /// Accept incoming offers automatically when they cost the bot nothing.
    pub auto_offer_accept: bool,
    pub poll_interval_ms: u64,
    /// How long a sent offer may stay Active before the poller cancels it.
    pub cancel_time_ms: u64,
    /// How long a sent offer may stay CreatedNeedsConfirmation before the
    /// poller cancels it.
    pub pending_cancel_time_ms: u64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            app_id: 730,
            context_id: 2,
            auto_offer_accept: false,
            poll_interval_ms: 15_000,
            cancel_time_ms: 3 * 60 * 1000,
            pending_cancel_time_ms: 20_000,
        }
    }
}

/// Fixed-delay retry budget for one operation kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    pub delay_ms: u64,
    pub attempts: i32,
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetriesConfig {
    pub received_items: RetryConfig,
    pub cancel: RetryConfig,
    pub accept: RetryConfig,
}

impl Default for RetriesConfig {
    fn default() -> Self {
        Self {
            received_items: RetryConfig { delay_ms: 10_000, attempts: 10 },
            cancel: RetryConfig { delay_ms: 5_000, attempts: 5 },
            accept: RetryConfig { delay_ms: 5_000, attempts: 5 },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub enable_offer_logging: bool,
    pub enable_poll_logging: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable_offer_logging: true,
            enable_poll_logging: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub account: AccountConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub retries: RetriesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Directory for persisted cookie/oauth blobs.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String {
    "data".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            account: AccountConfig {
                account_name: String::new(),
                password: String::new(),
                shared_secret: String::new(),
                identity_secret: String::new(),
                api_key: String::new(),
                steam_id: 0,
            },
            trading: TradingConfig::default(),
            retries: RetriesConfig::default(),
            logging: LoggingConfig::default(),
            data_dir: default_data_dir(),
        }
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

    /// Load configuration from file, or create default if file doesn't exist.
    /// The default is a template: it still fails validation until credentials
    /// are filled in.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            let config = Self::default();
            config.to_file(&path)?;
            tracing::info!("Created config template: {}", path.as_ref().display());
            Ok(config)
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.account.account_name.is_empty() {
            return Err(ConfigError::Validation("account_name is required".to_string()));
        }

        if self.account.password.is_empty() {
            return Err(ConfigError::Validation("password is required".to_string()));
        }

        if self.account.shared_secret.is_empty() {
            return Err(ConfigError::Validation("shared_secret is required".to_string()));
        }

        if self.account.identity_secret.is_empty() {
            return Err(ConfigError::Validation("identity_secret is required".to_string()));
        }

        if self.account.api_key.is_empty() {
            return Err(ConfigError::Validation("api_key is required".to_string()));
        }

        if self.account.steam_id == 0 {
            return Err(ConfigError::Validation("steam_id is required".to_string()));
        }

        if self.trading.poll_interval_ms < 1000 {
            return Err(ConfigError::Validation("poll_interval_ms must be at least 1000".to_string()));
        }

        if self.retries.received_items.attempts < 0
            || self.retries.cancel.attempts < 0
            || self.retries.accept.attempts < 0
        {
            return Err(ConfigError::Validation("retry attempts must be non-negative".to_string()));
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
