//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use crate::workers::payment_confirmation::PollingPolicy;
use std::env;

const DEFAULT_API_BASE_URL: &str = "https://muterianc.pythonanywhere.com/api";

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub polling: PollingPolicy,
    pub logging: LoggingConfig,
}

/// Payment backend configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    /// Bearer token handed over by the auth layer.
    pub api_token: String,
    pub request_timeout_secs: u64,
    /// Applies to balance reads only; status checks are retried by the poll loop.
    pub max_retries: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            gateway: GatewayConfig::from_env()?,
            polling: PollingPolicy::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gateway.validate()?;
        self.polling.validate()?;
        self.logging.validate()?;

        Ok(())
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(GatewayConfig {
            base_url: env::var("PAYMENT_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string()),
            api_token: env::var("PAYMENT_API_TOKEN")
                .map_err(|_| ConfigError::MissingVariable("PAYMENT_API_TOKEN".to_string()))?,
            request_timeout_secs: env::var("PAYMENT_API_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PAYMENT_API_TIMEOUT_SECS".to_string()))?,
            max_retries: env::var("PAYMENT_API_MAX_RETRIES")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PAYMENT_API_MAX_RETRIES".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "PAYMENT_API_BASE_URL must be a valid URL".to_string(),
            ));
        }

        if self.api_token.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "PAYMENT_API_TOKEN cannot be empty".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "PAYMENT_API_TIMEOUT_SECS".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            format: LogFormat::Plain,
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),
}
