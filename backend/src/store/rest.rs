use async_trait::async_trait;
use portal_common::{
    FieldDefinition, FieldDefinitionPatch, NewFieldDefinition, NewRegistration, Registration,
    RegistrationPatch, RegistrationStatus,
};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{RecordStore, Result, StoreError};

const USERS_TABLE: &str = "users";
const FIELDS_TABLE: &str = "custom_fields";

/// PostgREST error code for a unique constraint violation.
const UNIQUE_VIOLATION: &str = "23505";
/// PostgREST error code for "no rows" on a single-row request.
const NO_ROWS: &str = "PGRST116";

/// Client for a hosted PostgREST-style backend (`/rest/v1/<table>`).
pub struct RestStore {
    http_client: Client,
    base_url: String,
    api_key: String,
}

/// Error body returned by PostgREST.
#[derive(Debug, Deserialize)]
struct RestErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// Insert payload for a registration; new rows always start pending.
#[derive(Debug, Serialize)]
struct InsertRegistration<'a> {
    #[serde(flatten)]
    record: &'a NewRegistration,
    status: RegistrationStatus,
}

impl RestStore {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: reqwest::Method, table: &str) -> RequestBuilder {
        self.http_client
            .request(method, self.table_url(table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    /// Send a request and decode the JSON array PostgREST answers with.
    async fn rows<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Vec<T>> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn execute(&self, request: RequestBuilder) -> Result<()> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        check_status(response).await?;
        Ok(())
    }
}

/// Map a non-success response to a store error.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!("Record store request failed: {}: {}", status, body);

    let parsed: Option<RestErrorBody> = serde_json::from_str(&body).ok();
    let message = parsed
        .as_ref()
        .and_then(|b| b.message.clone().or_else(|| b.details.clone()))
        .unwrap_or_else(|| format!("{}: {}", status, body));

    match parsed.and_then(|b| b.code).as_deref() {
        Some(UNIQUE_VIOLATION) => Err(StoreError::UniqueViolation(message)),
        Some(NO_ROWS) => Err(StoreError::NotFound(message)),
        _ if status == reqwest::StatusCode::NOT_FOUND => Err(StoreError::NotFound(message)),
        _ => Err(StoreError::Database(message)),
    }
}

fn first_row<T>(rows: Vec<T>, what: impl FnOnce() -> String) -> Result<T> {
    rows.into_iter()
        .next()
        .ok_or_else(|| StoreError::NotFound(what()))
}

#[async_trait]
impl RecordStore for RestStore {
    fn backend_name(&self) -> &'static str {
        "rest"
    }

    async fn exists_user_id(&self, user_id: &str) -> Result<bool> {
        #[derive(Deserialize)]
        struct IdOnly {
            #[allow(dead_code)]
            id: i64,
        }

        let request = self
            .request(reqwest::Method::GET, USERS_TABLE)
            .query(&[("select", "id".to_string()), ("user_id", format!("eq.{}", user_id))]);
        let rows: Vec<IdOnly> = self.rows(request).await?;
        Ok(!rows.is_empty())
    }

    async fn create_record(&self, record: &NewRegistration) -> Result<Registration> {
        let request = self
            .request(reqwest::Method::POST, USERS_TABLE)
            .header("Prefer", "return=representation")
            .json(&InsertRegistration {
                record,
                status: RegistrationStatus::Pending,
            });
        let rows = self.rows(request).await?;
        first_row(rows, || format!("inserted registration {}", record.user_id))
    }

    async fn list_records(&self) -> Result<Vec<Registration>> {
        let request = self
            .request(reqwest::Method::GET, USERS_TABLE)
            .query(&[("select", "*"), ("order", "created_at.desc")]);
        self.rows(request).await
    }

    async fn get_record(&self, id: i64) -> Result<Option<Registration>> {
        let request = self
            .request(reqwest::Method::GET, USERS_TABLE)
            .query(&[("select", "*".to_string()), ("id", format!("eq.{}", id))]);
        let rows: Vec<Registration> = self.rows(request).await?;
        Ok(rows.into_iter().next())
    }

    async fn update_record(&self, id: i64, patch: &RegistrationPatch) -> Result<Registration> {
        let request = self
            .request(reqwest::Method::PATCH, USERS_TABLE)
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(patch);
        let rows = self.rows(request).await?;
        first_row(rows, || format!("registration {}", id))
    }

    async fn delete_record(&self, id: i64) -> Result<()> {
        let request = self
            .request(reqwest::Method::DELETE, USERS_TABLE)
            .query(&[("id", format!("eq.{}", id))]);
        self.execute(request).await
    }

    async fn list_field_definitions(&self) -> Result<Vec<FieldDefinition>> {
        let request = self
            .request(reqwest::Method::GET, FIELDS_TABLE)
            .query(&[("select", "*"), ("order", "created_at.asc")]);
        self.rows(request).await
    }

    async fn create_field_definition(&self, definition: &NewFieldDefinition) -> Result<FieldDefinition> {
        let request = self
            .request(reqwest::Method::POST, FIELDS_TABLE)
            .header("Prefer", "return=representation")
            .json(definition);
        let rows = self.rows(request).await?;
        first_row(rows, || format!("inserted field {}", definition.name))
    }

    async fn update_field_definition(
        &self,
        id: &str,
        patch: &FieldDefinitionPatch,
    ) -> Result<FieldDefinition> {
        let request = self
            .request(reqwest::Method::PATCH, FIELDS_TABLE)
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(patch);
        let rows = self.rows(request).await?;
        first_row(rows, || format!("field {}", id))
    }

    async fn delete_field_definition(&self, id: &str) -> Result<()> {
        let request = self
            .request(reqwest::Method::DELETE, FIELDS_TABLE)
            .query(&[("id", format!("eq.{}", id))]);
        self.execute(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_url_trims_trailing_slash() {
        let store = RestStore::new("https://db.example.com/", "key");
        assert_eq!(store.table_url("users"), "https://db.example.com/rest/v1/users");
    }

    #[test]
    fn test_insert_payload_forces_pending() {
        let record = NewRegistration {
            profile: "Alice".to_string(),
            user_id: "A1".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(InsertRegistration {
            record: &record,
            status: RegistrationStatus::Pending,
        })
        .unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["user_id"], "A1");
        assert!(json.get("id").is_none());
    }
}
