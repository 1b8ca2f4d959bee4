//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `DASHBOARD_EVENTS` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use dashboard_realtime::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {:?}", config.server.socket_addr());
//! ```

mod auth;
mod database;
mod error;
mod events;
mod redis;
mod server;

pub use auth::AuthConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use events::EventsConfig;
pub use redis::RedisConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration
///
/// Every section has defaults, so an empty environment yields a
/// local-only service that still requires a JWT secret to validate.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (change feed source)
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Redis configuration (broadcast bus)
    #[serde(default)]
    pub redis: RedisConfig,

    /// Authentication configuration (JWT)
    #[serde(default)]
    pub auth: AuthConfig,

    /// Realtime event subsystem
    #[serde(default)]
    pub events: EventsConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `DASHBOARD_EVENTS` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `DASHBOARD_EVENTS__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `DASHBOARD_EVENTS__EVENTS__CHANGE_FEED_ENABLED=true` -> `events.change_feed_enabled = true`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("DASHBOARD_EVENTS")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for the first invalid section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.redis.validate()?;
        self.auth.validate(&self.server.environment)?;
        self.events.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::env;
    use std::sync::Mutex;

    // Mutex to ensure tests don't run in parallel (env vars are global)
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "DASHBOARD_EVENTS__AUTH__JWT_SECRET",
        "DASHBOARD_EVENTS__REDIS__URL",
        "DASHBOARD_EVENTS__DATABASE__URL",
        "DASHBOARD_EVENTS__SERVER__PORT",
        "DASHBOARD_EVENTS__SERVER__ENVIRONMENT",
        "DASHBOARD_EVENTS__EVENTS__CHANGE_FEED_ENABLED",
        "DASHBOARD_EVENTS__EVENTS__HEARTBEAT_INTERVAL_SECS",
    ];

    fn set_minimal_env() {
        env::set_var("DASHBOARD_EVENTS__AUTH__JWT_SECRET", "test-secret");
    }

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    fn load_with(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        set_minimal_env();
        for (key, value) in vars {
            env::set_var(key, value);
        }
        let result = AppConfig::load();
        clear_env();
        result
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let config = load_with(&[("DASHBOARD_EVENTS__REDIS__URL", "redis://localhost:6379")])
            .expect("config should load");

        assert_eq!(config.redis.url, "redis://localhost:6379");
        assert_eq!(
            config.auth.jwt_secret.as_ref().map(|s| s.expose_secret().as_str()),
            Some("test-secret")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_without_optional_sections() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let config = load_with(&[]).unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.environment, Environment::Development);
        assert!(!config.database.is_configured());
        assert!(!config.redis.is_configured());
        assert!(config.events.enabled);
        assert!(!config.events.change_feed_enabled);
    }

    #[test]
    fn test_nested_event_settings() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let config = load_with(&[
            ("DASHBOARD_EVENTS__EVENTS__CHANGE_FEED_ENABLED", "true"),
            ("DASHBOARD_EVENTS__EVENTS__HEARTBEAT_INTERVAL_SECS", "10"),
        ])
        .unwrap();

        assert!(config.events.change_feed_enabled);
        assert_eq!(config.events.heartbeat_interval_secs, 10);
    }

    #[test]
    fn test_is_production() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let config = load_with(&[("DASHBOARD_EVENTS__SERVER__ENVIRONMENT", "production")]).unwrap();
        assert!(config.is_production());
        // "test-secret" is too short for production
        assert_eq!(config.validate(), Err(ValidationError::WeakJwtSecret));
    }

    #[test]
    fn test_custom_server_port() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let config = load_with(&[("DASHBOARD_EVENTS__SERVER__PORT", "3000")]).unwrap();
        assert_eq!(config.server.port, 3000);
    }
}
