use axum::{
    Json,
    extract::{
        FromRequest, FromRequestParts, Path, Query, Request,
        rejection::JsonRejection,
    },
    http::request::Parts,
};
use serde::de::DeserializeOwned;

use crate::error::{ApiError, NON_FIELD_ERRORS};

/// JSON body extractor whose rejections are field-keyed 400 responses.
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(value) => Ok(Self(value.0)),
            Err(rejection) => {
                let message = match rejection {
                    JsonRejection::JsonDataError(err) => format!("Invalid JSON data: {}", err.body_text()),
                    JsonRejection::JsonSyntaxError(err) => format!("Invalid JSON syntax: {}", err.body_text()),
                    JsonRejection::MissingJsonContentType(_) => {
                        "Expected request with `Content-Type: application/json`.".to_string()
                    }
                    _ => "Failed to parse JSON body".to_string(),
                };
                Err(ApiError::field(NON_FIELD_ERRORS, message))
            }
        }
    }
}

/// Query-string extractor with the same error shape as [`AppJson`].
pub struct AppQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for AppQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(value) => Ok(Self(value.0)),
            Err(rejection) => Err(ApiError::field(NON_FIELD_ERRORS, rejection.body_text())),
        }
    }
}

/// Path extractor; a segment that does not parse addresses nothing, so it is a 404.
pub struct AppPath<T>(pub T);

impl<T, S> FromRequestParts<S> for AppPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(value) => Ok(Self(value.0)),
            Err(rejection) => {
                tracing::debug!("path rejected: {}", rejection.body_text());
                Err(ApiError::not_found("Not found."))
            }
        }
    }
}
