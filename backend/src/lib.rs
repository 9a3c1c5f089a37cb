pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod fields;
pub mod logging;
pub mod registration;
pub mod review;
pub mod routes;
pub mod storage;
pub mod store;
pub mod test_util;

pub use auth::{AdminAuth, LoginOutcome, LogoutPolicy, StaticCredentials};
pub use clock::{Clock, SystemClock};
pub use config::{Config, StoreBackend, StoreConfig};
pub use error::Error;
pub use review::{ReviewBoard, ReviewError, StatusCounts};
pub use storage::{ClientStorages, KeyValueStorage};
pub use store::{RecordStore, RestStore, SqliteStore, StoreError};

use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    /// Registrations and field definitions.
    pub store: Arc<dyn RecordStore>,
    /// Admin login gate.
    pub auth: AdminAuth,
    /// Per-client login throttle and session flags.
    pub clients: ClientStorages,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        let credentials = StaticCredentials::new(
            config.admin.username.clone(),
            config.admin.password.clone(),
        );
        let auth = AdminAuth::new(Arc::new(credentials), clock.clone(), config.admin.logout_policy);

        Self {
            config,
            store,
            auth,
            clients: ClientStorages::new(),
            clock,
        }
    }

    /// Name recorded as approver on status changes.
    pub fn approver(&self) -> &str {
        &self.config.admin.username
    }
}

/// Open the record store selected by configuration.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn RecordStore>, StoreError> {
    match config.backend {
        StoreBackend::Sqlite => Ok(Arc::new(SqliteStore::new(&config.database_url)?)),
        StoreBackend::Rest => {
            let url = config.rest_url.as_deref().unwrap_or_default();
            let key = config.api_key.as_deref().unwrap_or_default();
            Ok(Arc::new(RestStore::new(url, key)))
        }
    }
}
