use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use portal_common::{
    CustomValues, FieldDefinition, FieldDefinitionPatch, NewFieldDefinition, NewRegistration,
    Registration, RegistrationPatch,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{RecordStore, Result, StoreError};

const RECORD_COLUMNS: &str = "id, uuid, created_at, updated_at, profile, user_id, whatsapp, country, \
     url, is_admin, status, approval_date, approved_by, custom_fields";

const FIELD_COLUMNS: &str = "id, name, type, required, options, created_at";

/// SQLite-backed record store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn db_err(e: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(err, msg) = &e {
        if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        {
            return StoreError::UniqueViolation(msg.clone().unwrap_or_else(|| e.to_string()));
        }
    }
    StoreError::Database(e.to_string())
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode(format!("bad timestamp '{}': {}", raw, e)))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| StoreError::Decode(e.to_string()))
}

fn opt_text(value: Option<String>) -> Value {
    value.map(Value::Text).unwrap_or(Value::Null)
}

/// Raw `users` row before timestamp and JSON decoding.
struct RecordRow {
    id: i64,
    uuid: String,
    created_at: String,
    updated_at: String,
    profile: String,
    user_id: String,
    whatsapp: String,
    country: String,
    url: Option<String>,
    is_admin: bool,
    status: String,
    approval_date: Option<String>,
    approved_by: Option<String>,
    custom_fields: String,
}

impl RecordRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            uuid: row.get(1)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
            profile: row.get(4)?,
            user_id: row.get(5)?,
            whatsapp: row.get(6)?,
            country: row.get(7)?,
            url: row.get(8)?,
            is_admin: row.get::<_, i32>(9)? != 0,
            status: row.get(10)?,
            approval_date: row.get(11)?,
            approved_by: row.get(12)?,
            custom_fields: row.get(13)?,
        })
    }

    fn into_registration(self) -> Result<Registration> {
        let custom_fields: CustomValues = serde_json::from_str(&self.custom_fields)
            .map_err(|e| StoreError::Decode(format!("custom_fields of {}: {}", self.id, e)))?;

        Ok(Registration {
            id: self.id,
            uuid: self.uuid,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            profile: self.profile,
            user_id: self.user_id,
            whatsapp: self.whatsapp,
            country: self.country,
            url: self.url,
            is_admin: self.is_admin,
            status: self
                .status
                .parse()
                .map_err(|e: portal_common::UnknownStatus| StoreError::Decode(e.to_string()))?,
            approval_date: self.approval_date.as_deref().map(parse_timestamp).transpose()?,
            approved_by: self.approved_by,
            custom_fields,
        })
    }
}

/// Raw `custom_fields` row.
struct FieldRow {
    id: String,
    name: String,
    kind: String,
    required: bool,
    options: String,
    created_at: String,
}

impl FieldRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            kind: row.get(2)?,
            required: row.get::<_, i32>(3)? != 0,
            options: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn into_definition(self) -> Result<FieldDefinition> {
        let kind = serde_json::from_value(serde_json::Value::String(self.kind.clone()))
            .map_err(|_| StoreError::Decode(format!("unknown field type '{}'", self.kind)))?;
        let options: Vec<String> = serde_json::from_str(&self.options)
            .map_err(|e| StoreError::Decode(format!("options of {}: {}", self.id, e)))?;

        Ok(FieldDefinition {
            id: self.id,
            name: self.name,
            kind,
            required: self.required,
            options,
            created_at: Some(parse_timestamp(&self.created_at)?),
        })
    }
}

impl SqliteStore {
    pub fn new(database_url: &str) -> Result<Self> {
        // Parse sqlite: prefix if present
        let path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);

        // Create parent directories if needed
        if path != ":memory:" {
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Database(e.to_string()))?;
            }
        }

        let conn = Connection::open(path).map_err(db_err)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                uuid TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                profile TEXT NOT NULL,
                user_id TEXT NOT NULL UNIQUE,
                whatsapp TEXT NOT NULL,
                country TEXT NOT NULL,
                url TEXT,
                is_admin INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending',
                approval_date TEXT,
                approved_by TEXT,
                custom_fields TEXT NOT NULL DEFAULT '{}'
            )",
            [],
        ).map_err(db_err)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS custom_fields (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                type TEXT NOT NULL,
                required INTEGER NOT NULL DEFAULT 0,
                options TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL
            )",
            [],
        ).map_err(db_err)?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_users_created_at ON users(created_at)",
            [],
        ).map_err(db_err)?;

        tracing::info!("Record store initialized with database: {}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| StoreError::Database(e.to_string()))
    }

    fn select_record(conn: &Connection, id: i64) -> Result<Option<Registration>> {
        let row = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", RECORD_COLUMNS),
                params![id],
                RecordRow::from_row,
            )
            .optional()
            .map_err(db_err)?;
        row.map(RecordRow::into_registration).transpose()
    }

    fn select_field(conn: &Connection, id: &str) -> Result<Option<FieldDefinition>> {
        let row = conn
            .query_row(
                &format!("SELECT {} FROM custom_fields WHERE id = ?1", FIELD_COLUMNS),
                params![id],
                FieldRow::from_row,
            )
            .optional()
            .map_err(db_err)?;
        row.map(FieldRow::into_definition).transpose()
    }

    fn exists_user_id_sync(&self, user_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    fn create_record_sync(&self, record: &NewRegistration) -> Result<Registration> {
        let conn = self.lock()?;
        let now = timestamp(Utc::now());
        let uuid = uuid::Uuid::new_v4().to_string();

        conn.execute(
            "INSERT INTO users (uuid, created_at, updated_at, profile, user_id, whatsapp, country, url, is_admin, status, custom_fields)
             VALUES (?1, ?2, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', ?9)",
            params![
                uuid,
                now,
                record.profile,
                record.user_id,
                record.whatsapp,
                record.country,
                record.url,
                record.is_admin as i32,
                to_json(&record.custom_fields)?,
            ],
        ).map_err(db_err)?;

        let id = conn.last_insert_rowid();
        tracing::debug!("Inserted registration {} ({})", id, record.user_id);
        Self::select_record(&conn, id)?
            .ok_or_else(|| StoreError::NotFound(format!("registration {}", id)))
    }

    fn list_records_sync(&self) -> Result<Vec<Registration>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM users ORDER BY created_at DESC, id DESC",
                RECORD_COLUMNS
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], RecordRow::from_row)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        rows.into_iter().map(RecordRow::into_registration).collect()
    }

    fn get_record_sync(&self, id: i64) -> Result<Option<Registration>> {
        let conn = self.lock()?;
        Self::select_record(&conn, id)
    }

    fn update_record_sync(&self, id: i64, patch: &RegistrationPatch) -> Result<Registration> {
        let mut columns: Vec<&'static str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(profile) = &patch.profile {
            columns.push("profile");
            values.push(Value::Text(profile.clone()));
        }
        if let Some(whatsapp) = &patch.whatsapp {
            columns.push("whatsapp");
            values.push(Value::Text(whatsapp.clone()));
        }
        if let Some(country) = &patch.country {
            columns.push("country");
            values.push(Value::Text(country.clone()));
        }
        if let Some(url) = &patch.url {
            columns.push("url");
            values.push(opt_text(url.clone()));
        }
        if let Some(is_admin) = patch.is_admin {
            columns.push("is_admin");
            values.push(Value::Integer(is_admin as i64));
        }
        if let Some(status) = patch.status {
            columns.push("status");
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(approval_date) = patch.approval_date {
            columns.push("approval_date");
            values.push(opt_text(approval_date.map(timestamp)));
        }
        if let Some(approved_by) = &patch.approved_by {
            columns.push("approved_by");
            values.push(opt_text(approved_by.clone()));
        }
        if let Some(custom_fields) = &patch.custom_fields {
            columns.push("custom_fields");
            values.push(Value::Text(to_json(custom_fields)?));
        }
        columns.push("updated_at");
        values.push(Value::Text(timestamp(Utc::now())));

        let assignments = columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = ?{}", column, i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        values.push(Value::Integer(id));
        let sql = format!("UPDATE users SET {} WHERE id = ?{}", assignments, values.len());

        let conn = self.lock()?;
        let changed = conn.execute(&sql, params_from_iter(values.iter())).map_err(db_err)?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("registration {}", id)));
        }

        Self::select_record(&conn, id)?
            .ok_or_else(|| StoreError::NotFound(format!("registration {}", id)))
    }

    fn delete_record_sync(&self, id: i64) -> Result<()> {
        let conn = self.lock()?;
        let deleted = conn
            .execute("DELETE FROM users WHERE id = ?1", params![id])
            .map_err(db_err)?;
        tracing::debug!("Deleted {} registration row(s) for id {}", deleted, id);
        Ok(())
    }

    fn list_fields_sync(&self) -> Result<Vec<FieldDefinition>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM custom_fields ORDER BY created_at ASC, rowid ASC",
                FIELD_COLUMNS
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], FieldRow::from_row)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        rows.into_iter().map(FieldRow::into_definition).collect()
    }

    fn create_field_sync(&self, definition: &NewFieldDefinition) -> Result<FieldDefinition> {
        let conn = self.lock()?;
        let id = uuid::Uuid::new_v4().to_string();

        conn.execute(
            "INSERT INTO custom_fields (id, name, type, required, options, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                definition.name,
                definition.kind.to_string(),
                definition.required as i32,
                to_json(&definition.options)?,
                timestamp(Utc::now()),
            ],
        ).map_err(db_err)?;

        Self::select_field(&conn, &id)?
            .ok_or_else(|| StoreError::NotFound(format!("field {}", id)))
    }

    fn update_field_sync(&self, id: &str, patch: &FieldDefinitionPatch) -> Result<FieldDefinition> {
        let conn = self.lock()?;
        let current = Self::select_field(&conn, id)?
            .ok_or_else(|| StoreError::NotFound(format!("field {}", id)))?;
        let updated = patch.apply_to(&current);

        conn.execute(
            "UPDATE custom_fields SET name = ?1, type = ?2, required = ?3, options = ?4 WHERE id = ?5",
            params![
                updated.name,
                updated.kind.to_string(),
                updated.required as i32,
                to_json(&updated.options)?,
                id,
            ],
        ).map_err(db_err)?;

        Ok(updated)
    }

    fn delete_field_sync(&self, id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM custom_fields WHERE id = ?1", params![id])
            .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn exists_user_id(&self, user_id: &str) -> Result<bool> {
        self.exists_user_id_sync(user_id)
    }

    async fn create_record(&self, record: &NewRegistration) -> Result<Registration> {
        self.create_record_sync(record)
    }

    async fn list_records(&self) -> Result<Vec<Registration>> {
        self.list_records_sync()
    }

    async fn get_record(&self, id: i64) -> Result<Option<Registration>> {
        self.get_record_sync(id)
    }

    async fn update_record(&self, id: i64, patch: &RegistrationPatch) -> Result<Registration> {
        self.update_record_sync(id, patch)
    }

    async fn delete_record(&self, id: i64) -> Result<()> {
        self.delete_record_sync(id)
    }

    async fn list_field_definitions(&self) -> Result<Vec<FieldDefinition>> {
        self.list_fields_sync()
    }

    async fn create_field_definition(&self, definition: &NewFieldDefinition) -> Result<FieldDefinition> {
        self.create_field_sync(definition)
    }

    async fn update_field_definition(
        &self,
        id: &str,
        patch: &FieldDefinitionPatch,
    ) -> Result<FieldDefinition> {
        self.update_field_sync(id, patch)
    }

    async fn delete_field_definition(&self, id: &str) -> Result<()> {
        self.delete_field_sync(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_common::{FieldKind, FieldValue, RegistrationStatus};

    fn store() -> SqliteStore {
        SqliteStore::new(":memory:").unwrap()
    }

    fn new_record(user_id: &str) -> NewRegistration {
        NewRegistration {
            profile: format!("Profile {}", user_id),
            user_id: user_id.to_string(),
            whatsapp: "+55 (11) 98765-4321".to_string(),
            country: "Brasil".to_string(),
            url: None,
            is_admin: false,
            custom_fields: [("Team".to_string(), FieldValue::text("red"))].into_iter().collect(),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_pending_and_ids() {
        let store = store();
        let created = store.create_record(&new_record("A1")).await.unwrap();
        assert_eq!(created.status, RegistrationStatus::Pending);
        assert_eq!(created.user_id, "A1");
        assert!(!created.uuid.is_empty());
        assert_eq!(created.custom_fields.get("Team"), Some(&FieldValue::text("red")));
        assert!(store.exists_user_id("A1").await.unwrap());
        assert!(!store.exists_user_id("B2").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_user_id_is_unique_violation() {
        let store = store();
        store.create_record(&new_record("A1")).await.unwrap();
        let err = store.create_record(&new_record("A1")).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let store = store();
        let first = store.create_record(&new_record("A1")).await.unwrap();
        let second = store.create_record(&new_record("A2")).await.unwrap();
        let ids: Vec<i64> = store.list_records().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn test_update_only_touches_patched_columns() {
        let store = store();
        let created = store.create_record(&new_record("A1")).await.unwrap();
        let approved_at = Utc::now();
        let patch = RegistrationPatch {
            status: Some(RegistrationStatus::Approved),
            approval_date: Some(Some(approved_at)),
            approved_by: Some(Some("admin".to_string())),
            ..Default::default()
        };

        let updated = store.update_record(created.id, &patch).await.unwrap();
        assert_eq!(updated.status, RegistrationStatus::Approved);
        assert_eq!(updated.approved_by.as_deref(), Some("admin"));
        assert_eq!(
            updated.approval_date.map(|d| d.timestamp_micros()),
            Some(approved_at.timestamp_micros())
        );
        assert_eq!(updated.profile, created.profile);
        assert_eq!(updated.user_id, created.user_id);

        let cleared = store
            .update_record(created.id, &RegistrationPatch {
                approval_date: Some(None),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(cleared.approval_date, None);
    }

    #[tokio::test]
    async fn test_update_missing_record_not_found() {
        let store = store();
        let patch = RegistrationPatch {
            profile: Some("x".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            store.update_record(404, &patch).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_record() {
        let store = store();
        let created = store.create_record(&new_record("A1")).await.unwrap();
        store.delete_record(created.id).await.unwrap();
        assert!(store.get_record(created.id).await.unwrap().is_none());
        assert!(!store.exists_user_id("A1").await.unwrap());
    }

    #[tokio::test]
    async fn test_field_definitions_crud() {
        let store = store();
        let team = store
            .create_field_definition(&NewFieldDefinition {
                name: "Team".to_string(),
                kind: FieldKind::Select,
                required: true,
                options: vec!["red".to_string(), "blue".to_string()],
            })
            .await
            .unwrap();
        let age = store
            .create_field_definition(&NewFieldDefinition {
                name: "Age".to_string(),
                kind: FieldKind::Number,
                ..Default::default()
            })
            .await
            .unwrap();

        let names: Vec<String> = store
            .list_field_definitions()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["Team", "Age"]);

        let updated = store
            .update_field_definition(&age.id, &FieldDefinitionPatch {
                required: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(updated.required);
        assert_eq!(updated.kind, FieldKind::Number);

        store.delete_field_definition(&team.id).await.unwrap();
        assert_eq!(store.list_field_definitions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deleting_definition_keeps_record_values() {
        let store = store();
        let team = store
            .create_field_definition(&NewFieldDefinition {
                name: "Team".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let created = store.create_record(&new_record("A1")).await.unwrap();

        store.delete_field_definition(&team.id).await.unwrap();

        let record = store.get_record(created.id).await.unwrap().unwrap();
        assert_eq!(record.custom_fields.get("Team"), Some(&FieldValue::text("red")));
    }

    #[test]
    fn test_file_database_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("portal.db");
        let url = format!("sqlite:{}", path.display());
        SqliteStore::new(&url).unwrap();
        assert!(path.exists());
    }
}
