//! Admin session and review endpoints.
//!
//! `/login`, `/logout` and `/session` are open; everything under `/api` sits
//! behind [`require_admin`], which checks the session flags in the calling
//! client's storage.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use portal_common::{
    FieldDefinition, FieldDefinitionPatch, NewFieldDefinition, Registration, RegistrationPatch,
    RegistrationStatus,
};
use serde::{Deserialize, Serialize};

use super::{client_id, client_storage, existing_client_storage};
use crate::error::{Error, Result};
use crate::fields::{SortDirection, SortField, SortState, StatusFilter};
use crate::review::{ReviewBoard, StatusCounts};
use crate::AppState;

/// Middleware that requires an authenticated admin session.
async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let storage = match existing_client_storage(&state, request.headers()).await {
        Ok(Some(storage)) => storage,
        Ok(None) => return Error::Unauthorized.into_response(),
        Err(e) => return e.into_response(),
    };

    if !state.auth.is_authenticated(storage.as_ref()) {
        return Error::Unauthorized.into_response();
    }
    next.run(request).await
}

async fn load_board(state: &AppState) -> Result<ReviewBoard> {
    Ok(ReviewBoard::load(state.store.clone(), state.clock.clone()).await?)
}

// ========== Session ==========

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

/// Response for /admin/session.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub authenticated: bool,
    pub failed_attempts: u32,
    /// Minutes until the lockout ends, when locked
    pub locked_minutes: Option<i64>,
}

/// POST /admin/login - Attempt an admin login
async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<Response> {
    let storage = client_storage(&state, &headers).await?;
    let outcome = state
        .auth
        .attempt_login(storage.as_ref(), &body.username, &body.password);
    state.clients.release_if_empty(client_id(&headers)?).await;

    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    };
    Ok((status, Json(outcome)).into_response())
}

/// POST /admin/logout - End the admin session
async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<StatusCode> {
    if let Some(storage) = existing_client_storage(&state, &headers).await? {
        state.auth.logout(storage.as_ref());
        state.clients.release_if_empty(client_id(&headers)?).await;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /admin/session - Session flags and throttle state for this client
async fn session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SessionResponse>> {
    let Some(storage) = existing_client_storage(&state, &headers).await? else {
        return Ok(Json(SessionResponse {
            authenticated: false,
            failed_attempts: 0,
            locked_minutes: None,
        }));
    };
    let attempts = state.auth.attempts(storage.as_ref());

    Ok(Json(SessionResponse {
        authenticated: state.auth.is_authenticated(storage.as_ref()),
        failed_attempts: attempts.attempts,
        locked_minutes: attempts.lockout_remaining_minutes(state.clock.now_ms()),
    }))
}

// ========== Registrations ==========

/// Query parameters for the registrations API.
#[derive(Debug, Default, Deserialize)]
struct RegistrationsQuery {
    /// `all` or one status
    status: Option<String>,
    /// Free-text search term
    q: Option<String>,
    /// Sort column
    sort: Option<String>,
    /// Custom field name when sorting by `custom_fields`
    field: Option<String>,
    dir: Option<SortDirection>,
}

impl RegistrationsQuery {
    fn status_filter(&self) -> Result<StatusFilter> {
        self.status
            .as_deref()
            .unwrap_or_default()
            .parse()
            .map_err(|e: portal_common::UnknownStatus| Error::Validation(e.to_string()))
    }

    fn sort_state(&self) -> Result<SortState> {
        match self.sort.as_deref() {
            None => Ok(SortState {
                direction: self.dir.unwrap_or_default(),
                ..Default::default()
            }),
            Some(column) => {
                let field = SortField::parse(column, self.field.as_deref())
                    .ok_or_else(|| Error::Validation(format!("Unknown sort column: {}", column)))?;
                Ok(SortState::new(field, self.dir.unwrap_or(SortDirection::Asc)))
            }
        }
    }
}

/// Response for /admin/api/registrations.
#[derive(Debug, Serialize)]
pub struct RegistrationsResponse {
    pub registrations: Vec<Registration>,
    pub counts: StatusCounts,
    pub fields: Vec<FieldDefinition>,
}

#[derive(Debug, Deserialize)]
struct StatusChange {
    status: RegistrationStatus,
}

/// GET /admin/api/registrations - Filtered, searched and sorted records
async fn list_registrations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RegistrationsQuery>,
) -> Result<Json<RegistrationsResponse>> {
    let filter = query.status_filter()?;
    let sort = query.sort_state()?;
    let board = load_board(&state).await?;

    Ok(Json(RegistrationsResponse {
        registrations: board.visible(filter, query.q.as_deref().unwrap_or_default(), &sort),
        counts: board.status_counts(),
        fields: board.definitions().to_vec(),
    }))
}

/// GET /admin/api/registrations/:id
async fn get_registration(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Registration>> {
    state
        .store
        .get_record(id)
        .await?
        .map(Json)
        .ok_or_else(|| Error::NotFound(format!("Registration {} not found", id)))
}

/// PATCH /admin/api/registrations/:id - Edit a record
async fn edit_registration(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(patch): Json<RegistrationPatch>,
) -> Result<Json<Registration>> {
    let mut board = load_board(&state).await?;
    Ok(Json(board.edit(id, patch, state.approver()).await?))
}

/// DELETE /admin/api/registrations/:id
async fn delete_registration(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    let mut board = load_board(&state).await?;
    board.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /admin/api/registrations/:id/status - Approve, reject, ban or reset
async fn change_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<StatusChange>,
) -> Result<Json<Registration>> {
    let mut board = load_board(&state).await?;
    Ok(Json(board.change_status(id, body.status, state.approver()).await?))
}

// ========== Field definitions ==========

/// GET /admin/api/fields
async fn list_fields(State(state): State<Arc<AppState>>) -> Result<Json<Vec<FieldDefinition>>> {
    Ok(Json(state.store.list_field_definitions().await?))
}

/// POST /admin/api/fields - Declare a new custom field
async fn create_field(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewFieldDefinition>,
) -> Result<(StatusCode, Json<FieldDefinition>)> {
    let mut board = load_board(&state).await?;
    let created = board.create_field(body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// PATCH /admin/api/fields/:id
async fn update_field(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<FieldDefinitionPatch>,
) -> Result<Json<FieldDefinition>> {
    let mut board = load_board(&state).await?;
    Ok(Json(board.update_field(&id, body).await?))
}

/// DELETE /admin/api/fields/:id
async fn delete_field(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let mut board = load_board(&state).await?;
    board.delete_field(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router(state: Arc<AppState>) -> Router {
    // Session endpoints are reachable without a session
    let session_routes = Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/session", get(session))
        .with_state(state.clone());

    // Review API with middleware authentication
    let api_routes = Router::new()
        .route("/api/registrations", get(list_registrations))
        .route(
            "/api/registrations/:id",
            get(get_registration)
                .patch(edit_registration)
                .delete(delete_registration),
        )
        .route("/api/registrations/:id/status", post(change_status))
        .route("/api/fields", get(list_fields).post(create_field))
        .route("/api/fields/:id", patch(update_field).delete(delete_field))
        .layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .with_state(state);

    session_routes.merge(api_routes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &str) -> RegistrationsQuery {
        serde_json::from_str(pairs).unwrap()
    }

    #[test]
    fn test_default_query_sorts_newest_first() {
        let q = RegistrationsQuery::default();
        assert_eq!(q.status_filter().unwrap(), StatusFilter::All);
        assert_eq!(q.sort_state().unwrap(), SortState::default());
    }

    #[test]
    fn test_sort_column_defaults_to_ascending() {
        let q = query(r#"{"sort":"profile"}"#);
        assert_eq!(
            q.sort_state().unwrap(),
            SortState::new(SortField::Profile, SortDirection::Asc)
        );

        let q = query(r#"{"sort":"custom_fields","field":"Team","dir":"desc"}"#);
        assert_eq!(
            q.sort_state().unwrap(),
            SortState::new(SortField::Custom(Some("Team".to_string())), SortDirection::Desc)
        );
    }

    #[test]
    fn test_bad_query_values_rejected() {
        assert!(query(r#"{"status":"archived"}"#).status_filter().is_err());
        assert!(query(r#"{"sort":"password"}"#).sort_state().is_err());
    }
}
