//! Request handlers, grouped by resource family.
//!
//! Every handler follows the same order: request-level permission check, lookups
//! (404), object-level permission check, payload validation (400), then the write.

use axum::{Json, http::Method};
use serde_json::{Value, json};

use crate::error::ApiError;

pub mod auth;
pub mod catalog;
pub mod reviews;
pub mod users;

/// Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Fallback for verbs a route does not serve. Runs before any authentication.
pub async fn method_not_allowed(method: Method) -> ApiError {
    ApiError::MethodNotAllowed(method)
}
