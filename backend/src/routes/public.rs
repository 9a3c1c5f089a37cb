//! Unauthenticated registration endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use portal_common::{FieldDefinition, Registration};
use serde::Serialize;

use crate::error::Result;
use crate::registration::{self, RegistrationForm};
use crate::AppState;

/// Response for /api/user-ids/:user_id.
#[derive(Debug, Serialize)]
pub struct UserIdAvailability {
    pub user_id: String,
    pub available: bool,
}

/// GET /api/fields - Definitions the registration form must render
async fn list_fields(State(state): State<Arc<AppState>>) -> Result<Json<Vec<FieldDefinition>>> {
    Ok(Json(state.store.list_field_definitions().await?))
}

/// GET /api/user-ids/:user_id - Whether a user id is still free
async fn check_user_id(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<UserIdAvailability>> {
    let available = registration::check_user_id(state.store.as_ref(), &user_id).await?;
    Ok(Json(UserIdAvailability { user_id, available }))
}

/// POST /api/register - Submit a registration for review
async fn register(
    State(state): State<Arc<AppState>>,
    Json(form): Json<RegistrationForm>,
) -> Result<(StatusCode, Json<Registration>)> {
    let created = registration::submit(state.store.as_ref(), form).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/fields", get(list_fields))
        .route("/api/user-ids/:user_id", get(check_user_id))
        .route("/api/register", post(register))
        .with_state(state)
}
