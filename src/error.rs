use std::collections::BTreeMap;

use axum::{
    Json,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::repository::RepositoryError;

/// Field name → messages. Serialized as the body of a 400 response.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Key used for errors that do not belong to a single field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// ApiError
///
/// The error taxonomy every handler returns. Each variant maps to exactly one
/// status code; nothing is retried.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed: {0:?}")]
    Validation(FieldErrors),

    #[error("authentication required: {0}")]
    Unauthenticated(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("method {0} not allowed")]
    MethodNotAllowed(Method),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Single-field validation failure.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        ApiError::Validation(errors)
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        ApiError::NotFound(what.into())
    }

    pub fn unauthenticated() -> Self {
        ApiError::Unauthenticated("Authentication credentials were not provided.".to_string())
    }

    pub fn forbidden() -> Self {
        ApiError::Forbidden("You do not have permission to perform this action.".to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields = FieldErrors::new();
        for (field, errs) in errors.field_errors() {
            let messages = errs
                .iter()
                .map(|e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("Invalid value ({}).", e.code),
                })
                .collect();
            fields.insert(field.to_string(), messages);
        }
        ApiError::Validation(fields)
    }
}

impl From<RepositoryError> for ApiError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::UniqueViolation(constraint) => {
                ApiError::field(NON_FIELD_ERRORS, unique_message(&constraint))
            }
            RepositoryError::NotFound(what) => ApiError::NotFound(what),
            RepositoryError::Database(e) => ApiError::Internal(e.to_string()),
        }
    }
}

fn unique_message(constraint: &str) -> String {
    match constraint {
        "unique_title_author" => "You have already reviewed this title.".to_string(),
        "users_username_key" => "A user with that username already exists.".to_string(),
        "users_email_key" => "A user with that email already exists.".to_string(),
        "categories_slug_key" | "genres_slug_key" => {
            "An entry with this slug already exists.".to_string()
        }
        other => format!("Unique constraint violated: {other}"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::Validation(fields) => (status, Json(fields)).into_response(),
            ApiError::Internal(cause) => {
                tracing::error!("Internal error: {}", cause);
                (status, Json(json!({ "detail": "Internal server error" }))).into_response()
            }
            ApiError::MethodNotAllowed(method) => (
                status,
                Json(json!({ "detail": format!("Method \"{method}\" not allowed.") })),
            )
                .into_response(),
            ApiError::Unauthenticated(detail)
            | ApiError::Forbidden(detail)
            | ApiError::NotFound(detail) => {
                (status, Json(json!({ "detail": detail }))).into_response()
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
