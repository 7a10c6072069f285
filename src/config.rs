//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

use crate::service::BootstrapRequest;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Pool acquire timeout
    pub database_acquire_timeout: Duration,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Grace period for in-flight requests on shutdown
    pub shutdown_timeout: Duration,

    /// Zero-state admin bootstrap, when configured
    pub bootstrap: Option<BootstrapRequest>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections =
            positive_u32("DATABASE_MAX_CONNECTIONS", 10)?;
        let database_acquire_timeout =
            Duration::from_secs(positive_u32("DATABASE_ACQUIRE_TIMEOUT_SECS", 5)?.into());

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PORT"))?;

        let shutdown_timeout =
            Duration::from_secs(positive_u32("SHUTDOWN_TIMEOUT_SECS", 30)?.into());

        let bootstrap = bootstrap_from_env()?;

        Ok(Self {
            database_url,
            database_max_connections,
            database_acquire_timeout,
            host,
            port,
            shutdown_timeout,
            bootstrap,
        })
    }
}

fn positive_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.parse::<u32>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(ConfigError::InvalidValue(name)),
        },
    }
}

/// The bootstrap trio must be configured together or not at all.
fn bootstrap_from_env() -> Result<Option<BootstrapRequest>, ConfigError> {
    let tenant_name = env::var("BOOTSTRAP_TENANT_NAME").ok();
    let key_name = env::var("BOOTSTRAP_KEY_NAME").ok();
    let raw_api_key = env::var("BOOTSTRAP_API_KEY").ok();

    match (tenant_name, key_name, raw_api_key) {
        (None, None, None) => Ok(None),
        (Some(tenant_name), Some(key_name), Some(raw_api_key)) => Ok(Some(BootstrapRequest {
            tenant_name,
            key_name,
            raw_api_key,
        })),
        _ => Err(ConfigError::IncompleteBootstrap),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),

    #[error("BOOTSTRAP_TENANT_NAME, BOOTSTRAP_KEY_NAME, and BOOTSTRAP_API_KEY must be set together")]
    IncompleteBootstrap,
}
