//! Store API configuration module.
//!
//! Configuration is loaded from environment variables with fallback to
//! defaults. The two secrets (API token, webhook secret) have development
//! defaults so a local checkout runs out of the box; production deployments
//! MUST override them.

use serde::{Deserialize, Serialize};
use std::env;

/// Store API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// HTTP server port
    pub port: u16,

    /// Path to the SQLite database file
    pub database_path: String,

    /// Bearer token required on /api routes
    pub api_token: String,

    /// Shared secret for webhook HMAC signatures
    pub webhook_secret: String,

    /// Branch all API-created entities are scoped to
    pub default_branch_id: String,

    /// Store id recorded as `source_channel` on webhook-created entities
    pub store_id: String,
}

impl ApiConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let config = ApiConfig {
            port: env::var("API_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("API_PORT".to_string()))?,

            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "tally.db".to_string()),

            api_token: env::var("API_TOKEN")
                .unwrap_or_else(|_| "tally-dev-token-change-in-production".to_string()),

            webhook_secret: env::var("WEBHOOK_SECRET")
                .unwrap_or_else(|_| "tally-dev-webhook-secret-change-in-production".to_string()),

            default_branch_id: env::var("DEFAULT_BRANCH_ID")
                .unwrap_or_else(|_| "branch-main".to_string()),

            store_id: env::var("STORE_ID").unwrap_or_else(|_| "webstore".to_string()),
        };

        if config.api_token.trim().is_empty() {
            return Err(ConfigError::MissingRequired("API_TOKEN".to_string()));
        }
        if config.webhook_secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("WEBHOOK_SECRET".to_string()));
        }

        Ok(config)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_load() {
        let config = ApiConfig::load().unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.default_branch_id, "branch-main");
        assert!(!config.api_token.is_empty());
    }
}
