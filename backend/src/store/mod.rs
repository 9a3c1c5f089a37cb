//! Remote data gateway.
//!
//! This module defines the `RecordStore` trait: CRUD over registrations and
//! custom field definitions. The portal never owns the schema itself; it is
//! either an embedded SQLite file or a hosted PostgREST-style backend.

mod rest;
mod sqlite;

pub use rest::RestStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use portal_common::{
    FieldDefinition, FieldDefinitionPatch, NewFieldDefinition, NewRegistration, Registration,
    RegistrationPatch,
};

/// Errors reported by a record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Uniqueness violation: {0}")]
    UniqueViolation(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Decode error: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// CRUD access to registrations and custom field definitions.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Short backend name for logs (e.g., "sqlite", "rest").
    fn backend_name(&self) -> &'static str;

    /// Whether a registration already uses this user-chosen ID.
    async fn exists_user_id(&self, user_id: &str) -> Result<bool>;

    /// Insert a registration. The store assigns ids, timestamps and
    /// `pending` status.
    async fn create_record(&self, record: &NewRegistration) -> Result<Registration>;

    /// All registrations, newest first.
    async fn list_records(&self) -> Result<Vec<Registration>>;

    async fn get_record(&self, id: i64) -> Result<Option<Registration>>;

    /// Apply a partial update. Fails with `NotFound` if the record is gone.
    async fn update_record(&self, id: i64, patch: &RegistrationPatch) -> Result<Registration>;

    async fn delete_record(&self, id: i64) -> Result<()>;

    /// All field definitions, oldest first.
    async fn list_field_definitions(&self) -> Result<Vec<FieldDefinition>>;

    async fn create_field_definition(&self, definition: &NewFieldDefinition) -> Result<FieldDefinition>;

    async fn update_field_definition(
        &self,
        id: &str,
        patch: &FieldDefinitionPatch,
    ) -> Result<FieldDefinition>;

    /// Remove a definition. Values stored under its name in existing records
    /// are left in place.
    async fn delete_field_definition(&self, id: &str) -> Result<()>;
}
