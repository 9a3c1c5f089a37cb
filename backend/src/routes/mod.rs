pub mod admin;
pub mod health;
pub mod public;

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::{middleware, Router};

use crate::error::{Error, Result};
use crate::logging::request_logger;
use crate::storage::KeyValueStorage;
use crate::AppState;

/// Header carrying the caller's client identity.
pub const CLIENT_HEADER: &str = "x-portal-client";

/// All portal routes with request logging.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health::router(state.clone()))
        .merge(public::router(state.clone()))
        .nest("/admin", admin::router(state))
        .layer(middleware::from_fn(request_logger))
}

/// Client identity from the `x-portal-client` header.
pub(crate) fn client_id(headers: &HeaderMap) -> Result<&str> {
    headers
        .get(CLIENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(Error::MissingClient)
}

/// Storage of the calling client, created on first use.
pub(crate) async fn client_storage(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Arc<dyn KeyValueStorage>> {
    Ok(state.clients.get_or_create(client_id(headers)?).await)
}

/// Storage of the calling client, if it has any.
pub(crate) async fn existing_client_storage(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<Arc<dyn KeyValueStorage>>> {
    Ok(state.clients.get(client_id(headers)?).await)
}
