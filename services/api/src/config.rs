//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
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
    /// Public origin of the site, used to build redirect targets.
    pub public_origin: String,
    pub cors_origin: String,
    /// Development mode redirects to `public_origin` even behind a proxy.
    pub development: bool,
    /// Only addresses in this domain may use the student area and enroll.
    pub allowed_email_domain: String,
    pub identity_url: String,
    pub identity_api_key: String,
    pub run_migrations: bool,
    pub session_ttl_days: i64,
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("'{}' is not a boolean", value),
        )),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let run_migrations = match std::env::var("RUN_MIGRATIONS") {
            Ok(v) => parse_bool("RUN_MIGRATIONS", &v)?,
            Err(_) => true,
        };

        // --- Load Site Settings ---
        let public_origin = std::env::var("PUBLIC_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();
        let cors_origin = std::env::var("CORS_ORIGIN").unwrap_or_else(|_| public_origin.clone());
        let development = std::env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("development"))
            .unwrap_or(false);

        // --- Load Identity Settings ---
        let allowed_email_domain = std::env::var("ALLOWED_EMAIL_DOMAIN")
            .unwrap_or_else(|_| "shukutoku.ed.jp".to_string())
            .trim_start_matches('@')
            .to_string();
        let identity_url = std::env::var("IDENTITY_URL")
            .map_err(|_| ConfigError::MissingVar("IDENTITY_URL".to_string()))?
            .trim_end_matches('/')
            .to_string();
        let identity_api_key = std::env::var("IDENTITY_API_KEY")
            .map_err(|_| ConfigError::MissingVar("IDENTITY_API_KEY".to_string()))?;

        let session_ttl_days = match std::env::var("SESSION_TTL_DAYS") {
            Ok(v) => v.parse::<i64>().ok().filter(|d| *d > 0).ok_or_else(|| {
                ConfigError::InvalidValue(
                    "SESSION_TTL_DAYS".to_string(),
                    format!("'{}' is not a positive number of days", v),
                )
            })?,
            Err(_) => 30,
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            public_origin,
            cors_origin,
            development,
            allowed_email_domain,
            identity_url,
            identity_api_key,
            run_migrations,
            session_ttl_days,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booleans_accept_common_spellings() {
        assert!(parse_bool("X", "TRUE").unwrap());
        assert!(!parse_bool("X", "off").unwrap());
        assert!(matches!(
            parse_bool("X", "maybe"),
            Err(ConfigError::InvalidValue(name, _)) if name == "X"
        ));
    }
}
