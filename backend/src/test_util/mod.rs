//! Shared helpers for unit and integration tests.

use std::sync::Arc;

use crate::clock::ManualClock;
use crate::config::{AdminConfig, Config, LoggingConfig, ServerConfig, StoreConfig};
use crate::store::{RecordStore, SqliteStore};
use crate::AppState;

/// 2024-01-01T00:00:00Z
pub const TEST_NOW_MS: i64 = 1_704_067_200_000;

pub const TEST_CLIENT: &str = "test-client";

pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            cors_origins: "*".to_string(),
        },
        store: StoreConfig {
            database_url: ":memory:".to_string(),
            ..Default::default()
        },
        admin: AdminConfig {
            username: "admin".to_string(),
            password: "admin@123".to_string(),
            ..Default::default()
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
        },
    }
}

/// State over an in-memory SQLite store and a manual clock.
pub fn create_test_state() -> (Arc<AppState>, Arc<ManualClock>) {
    let config = test_config();
    let store: Arc<dyn RecordStore> =
        Arc::new(SqliteStore::new(&config.store.database_url).unwrap());
    create_test_state_with_store(config, store)
}

pub fn create_test_state_with_store(
    config: Config,
    store: Arc<dyn RecordStore>,
) -> (Arc<AppState>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(TEST_NOW_MS));
    let state = Arc::new(AppState::new(config, store, clock.clone()));
    (state, clock)
}
