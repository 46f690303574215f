//! Configuration management following 12-factor app principles
//!
//! All configuration is loaded from environment variables to ensure
//! clean separation between code and config.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Default HTTP port for the local server
const DEFAULT_PORT: u16 = 8084;

/// Default inactivity threshold (minutes) before a conversation expires
const DEFAULT_EXPIRY_THRESHOLD_MINUTES: i64 = 1440;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,

    /// HTTP listen port
    pub port: u16,

    /// Inactivity threshold in minutes used by the external expiry
    /// scheduler when it does not supply one explicitly
    pub expiry_threshold_minutes: i64,

    /// Log filter directive (e.g. "info", "chatrelay=debug")
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let config = Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL is required"))?,

            port: env::var("PORT")
                .ok()
                .map(|p| p.parse::<u16>())
                .transpose()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid u16"))?
                .unwrap_or(DEFAULT_PORT),

            expiry_threshold_minutes: env::var("EXPIRY_THRESHOLD_MINUTES")
                .ok()
                .map(|v| v.parse::<i64>())
                .transpose()
                .map_err(|_| anyhow::anyhow!("EXPIRY_THRESHOLD_MINUTES must be an integer"))?
                .unwrap_or(DEFAULT_EXPIRY_THRESHOLD_MINUTES),

            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        };

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        // from_env reads the process environment; exercise the parsing
        // helpers directly instead to keep the test hermetic.
        let config = Config {
            database_url: "postgres://localhost/chatrelay".to_string(),
            port: DEFAULT_PORT,
            expiry_threshold_minutes: DEFAULT_EXPIRY_THRESHOLD_MINUTES,
            log_level: "info".to_string(),
        };
        assert_eq!(config.port, 8084);
        assert_eq!(config.expiry_threshold_minutes, 1440);
    }
}
