//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub cors_origin: String,

    pub openai_api_key: Option<String>,
    pub question_model: String,

    pub midtrans_server_key: String,
    pub midtrans_snap_url: String,
    pub midtrans_api_url: String,
    pub payment_expiry_minutes: u32,
    pub gateway_timeout: Duration,

    pub identity_introspection_url: String,
    pub identity_admin_url: String,
    pub identity_secret_key: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let required = |key: &str| lookup(key).ok_or_else(|| ConfigError::MissingVar(key.to_string()));

        // --- Server and Database Settings ---
        let bind_address_str = or_default("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = required("DATABASE_URL")?;

        let log_level_str = or_default("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin = or_default("CORS_ORIGIN", "http://localhost:5173");

        // --- Question Generation (optional) ---
        let openai_api_key = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty());
        let question_model = or_default("QUESTION_MODEL", "gpt-4o-mini");

        // --- Payment Gateway ---
        let midtrans_server_key = required("MIDTRANS_SERVER_KEY")?;
        let midtrans_snap_url = or_default(
            "MIDTRANS_SNAP_URL",
            "https://app.sandbox.midtrans.com/snap/v1/transactions",
        );
        let midtrans_api_url = or_default("MIDTRANS_API_URL", "https://api.sandbox.midtrans.com/v2");
        let payment_expiry_minutes = parse_number("PAYMENT_EXPIRY_MINUTES", &or_default("PAYMENT_EXPIRY_MINUTES", "60"))?;
        let timeout_secs: u64 = parse_number("GATEWAY_TIMEOUT_SECS", &or_default("GATEWAY_TIMEOUT_SECS", "10"))?;

        // --- Identity Provider ---
        let identity_introspection_url = required("IDENTITY_INTROSPECTION_URL")?;
        let identity_admin_url = required("IDENTITY_ADMIN_URL")?;
        let identity_secret_key = lookup("IDENTITY_SECRET_KEY");

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            cors_origin,
            openai_api_key,
            question_model,
            midtrans_server_key,
            midtrans_snap_url,
            midtrans_api_url,
            payment_expiry_minutes,
            gateway_timeout: Duration::from_secs(timeout_secs),
            identity_introspection_url,
            identity_admin_url,
            identity_secret_key,
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| {
        ConfigError::InvalidValue(key.to_string(), format!("'{}' is not a valid number", value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn minimal() -> HashMap<String, String> {
        env(&[
            ("DATABASE_URL", "postgres://localhost/quiz"),
            ("MIDTRANS_SERVER_KEY", "SB-Mid-server-xyz"),
            ("IDENTITY_INTROSPECTION_URL", "http://id.local/introspect"),
            ("IDENTITY_ADMIN_URL", "http://id.local/admin"),
        ])
    }

    #[test]
    fn defaults_fill_optional_settings() {
        let vars = minimal();
        let config = Config::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.payment_expiry_minutes, 60);
        assert_eq!(config.gateway_timeout, Duration::from_secs(10));
        assert_eq!(config.log_level, Level::INFO);
        assert!(config.openai_api_key.is_none());
    }

    #[test]
    fn missing_server_key_is_reported() {
        let mut vars = minimal();
        vars.remove("MIDTRANS_SERVER_KEY");
        let err = Config::from_lookup(|k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(ref k) if k == "MIDTRANS_SERVER_KEY"));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let mut vars = minimal();
        vars.insert("PAYMENT_EXPIRY_MINUTES".to_string(), "soon".to_string());
        let err = Config::from_lookup(|k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref k, _) if k == "PAYMENT_EXPIRY_MINUTES"));
    }
}
