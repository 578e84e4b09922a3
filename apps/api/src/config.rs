//! API configuration module.
//!
//! Configuration is loaded from environment variables (and an optional
//! `.env` file) with fallback to defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use tracing::warn;

/// Development-only JWT secret used when `APOTEK_JWT_SECRET` is unset.
const DEV_JWT_SECRET: &str = "apotek-dev-secret-change-in-production";

/// API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Bind host
    pub host: String,

    /// Bind port
    pub port: u16,

    /// SQLite database file
    pub database_path: PathBuf,

    /// Connection pool size
    pub db_max_connections: u32,

    /// Root of the generated PDF tree
    pub static_dir: PathBuf,

    /// HS256 secret for bearer tokens
    pub jwt_secret: String,

    /// Token lifetime in seconds
    pub jwt_expiry_secs: i64,

    /// Printed in the prescription PDF header
    pub company_name: String,

    /// Pharmacist name printed below the header
    pub pharmacist: String,

    /// Pharmacist license number printed below the header
    pub pharmacist_license: String,
}

impl ApiConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env file is normal outside development.
        let _ = dotenvy::dotenv();

        let jwt_secret = match env::var("APOTEK_JWT_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ => {
                warn!("APOTEK_JWT_SECRET not set, using development secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        let config = ApiConfig {
            host: env::var("APOTEK_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),

            port: parse_var("APOTEK_PORT", "8080")?,

            database_path: env::var("APOTEK_DATABASE_PATH")
                .unwrap_or_else(|_| "./data/apotek.db".to_string())
                .into(),

            db_max_connections: parse_var("APOTEK_DB_MAX_CONNECTIONS", "5")?,

            static_dir: env::var("APOTEK_STATIC_DIR")
                .unwrap_or_else(|_| "./static/pdf".to_string())
                .into(),

            jwt_secret,

            jwt_expiry_secs: parse_var("APOTEK_JWT_EXPIRY_SECS", "86400")?, // 1 day

            company_name: env::var("APOTEK_COMPANY_NAME").unwrap_or_else(|_| "Apotek".to_string()),

            pharmacist: env::var("APOTEK_PHARMACIST").unwrap_or_default(),

            pharmacist_license: env::var("APOTEK_PHARMACIST_LICENSE").unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Configuration for tests: artifacts under `static_dir`, fixed secret.
    pub fn for_static_dir(static_dir: impl Into<PathBuf>) -> Self {
        ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            database_path: PathBuf::from(":memory:"),
            db_max_connections: 1,
            static_dir: static_dir.into(),
            jwt_secret: "test-secret".to_string(),
            jwt_expiry_secs: 3600,
            company_name: "Apotek Sehat".to_string(),
            pharmacist: "apt. Budi".to_string(),
            pharmacist_license: "SIPA 123".to_string(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.db_max_connections == 0 {
            return Err(ConfigError::InvalidValue("APOTEK_DB_MAX_CONNECTIONS".to_string()));
        }

        if self.jwt_expiry_secs <= 0 {
            return Err(ConfigError::InvalidValue("APOTEK_JWT_EXPIRY_SECS".to_string()));
        }

        if self.static_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired("APOTEK_STATIC_DIR".to_string()));
        }

        Ok(())
    }

    /// `host:port` for the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: &str) -> Result<T, ConfigError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name.to_string()))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
