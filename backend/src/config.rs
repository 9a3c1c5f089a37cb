//! Configuration for the approval portal.

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

use crate::auth::LogoutPolicy;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origins (comma-separated, `*` for any)
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

/// Which record store implementation to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Embedded SQLite file
    #[default]
    Sqlite,
    /// Hosted PostgREST-style backend
    Rest,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// SQLite database URL, used by the `sqlite` backend
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Base URL of the hosted backend, required by the `rest` backend
    #[serde(default)]
    pub rest_url: Option<String>,
    /// Public API key sent with every hosted backend request
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            database_url: default_database_url(),
            rest_url: None,
            api_key: None,
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_username")]
    pub username: String,
    #[serde(default = "default_admin_password")]
    pub password: String,
    /// Whether logout also forgets failed login attempts
    #[serde(default)]
    pub logout_policy: LogoutPolicy,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            username: default_admin_username(),
            password: default_admin_password(),
            logout_policy: LogoutPolicy::default(),
        }
    }
}

impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("logout_policy", &self.logout_policy)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_cors_origins() -> String {
    "*".to_string()
}
fn default_database_url() -> String {
    "sqlite:./data/portal.db".to_string()
}
fn default_admin_username() -> String {
    "admin".to_string()
}
fn default_admin_password() -> String {
    "admin@123".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (PORTAL__SECTION__KEY format)
    /// 2. config.toml file (if present)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            // Set defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?
            .set_default("store.database_url", default_database_url())?
            // Load from config.toml if exists
            .add_source(File::with_name("config").required(false))
            // Override with environment variables (PORTAL__SECTION__KEY format)
            .add_source(
                Environment::with_prefix("PORTAL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.backend == StoreBackend::Rest {
            if self.store.rest_url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                return Err(ConfigError::Message(
                    "store.rest_url is required for the rest backend".to_string(),
                ));
            }
            if self.store.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
                return Err(ConfigError::Message(
                    "store.api_key is required for the rest backend".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            admin: AdminConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
