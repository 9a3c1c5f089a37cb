//! Client-scoped key/value storage.
//!
//! Each portal client (identified by the `x-portal-client` header) owns a
//! small string map holding its login attempt blob and session flags. Nothing
//! here is shared across clients or written to the record store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// String key/value storage owned by one client.
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;

    fn is_empty(&self) -> Result<bool, StorageError>;
}

/// In-memory storage for a single client.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        entries.remove(key);
        Ok(())
    }

    fn is_empty(&self) -> Result<bool, StorageError> {
        let entries = self.entries.lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(entries.is_empty())
    }
}

/// Registry of per-client storages.
pub struct ClientStorages {
    clients: RwLock<HashMap<String, Arc<dyn KeyValueStorage>>>,
}

impl ClientStorages {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Storage of a client that already has one.
    pub async fn get(&self, client_id: &str) -> Option<Arc<dyn KeyValueStorage>> {
        self.clients.read().await.get(client_id).cloned()
    }

    /// Get the storage for a client, creating an empty one on first use.
    pub async fn get_or_create(&self, client_id: &str) -> Arc<dyn KeyValueStorage> {
        if let Some(storage) = self.clients.read().await.get(client_id) {
            return storage.clone();
        }

        let mut clients = self.clients.write().await;
        clients
            .entry(client_id.to_string())
            .or_insert_with(|| {
                tracing::debug!("Created storage for client {}", client_id);
                Arc::new(MemoryStorage::new())
            })
            .clone()
    }

    /// Drop a client's storage once nothing is left in it.
    pub async fn release_if_empty(&self, client_id: &str) {
        let mut clients = self.clients.write().await;
        let empty = match clients.get(client_id).map(|storage| storage.is_empty()) {
            Some(Ok(empty)) => empty,
            Some(Err(e)) => {
                tracing::warn!("Storage check failed for client {}: {}", client_id, e);
                false
            }
            None => false,
        };
        if empty {
            clients.remove(client_id);
            tracing::debug!("Released storage for client {}", client_id);
        }
    }

    /// Number of clients with storage.
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}

impl Default for ClientStorages {
    fn default() -> Self {
        Self::new()
    }
}
