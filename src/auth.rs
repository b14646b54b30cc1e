use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};

use crate::{
    config::{AppConfig, Env},
    credentials::{CredentialError, CredentialState},
    error::ApiError,
    models::{Capabilities, Role, User},
    repository::RepositoryState,
};

/// Header accepted in local mode to act as an existing account without a token.
pub const DEV_USER_HEADER: &str = "x-user-id";

/// AuthUser Extractor Result
///
/// The resolved identity of an authenticated request. Role and superuser flag are read
/// from the store on every request, so role changes apply to tokens already issued.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub is_superuser: bool,
}

impl AuthUser {
    pub fn capabilities(&self) -> Capabilities {
        self.role.capabilities()
    }

    pub fn is_admin_or_superuser(&self) -> bool {
        self.capabilities().is_admin || self.is_superuser
    }
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            role: user.role,
            is_superuser: user.is_superuser,
        }
    }
}

/// Actor
///
/// Optional identity for endpoints open to anonymous readers. A request without
/// credentials yields `Actor(None)`; a request with bad credentials is still rejected.
#[derive(Debug, Clone)]
pub struct Actor(pub Option<AuthUser>);

/// Resolves the identity behind a request, if the request carries any credentials.
///
/// 1. Local bypass: `x-user-id` naming an existing account (Env::Local only).
/// 2. `Authorization: Bearer <token>` verified by the credential issuer.
/// 3. Store lookup, so deleted or deactivated accounts lose access immediately.
async fn resolve<S>(parts: &Parts, state: &S) -> Result<Option<AuthUser>, ApiError>
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    CredentialState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    let repo = RepositoryState::from_ref(state);
    let config = AppConfig::from_ref(state);

    if config.env == Env::Local {
        if let Some(user_id) = parts
            .headers
            .get(DEV_USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|id_str| id_str.parse::<i64>().ok())
        {
            if let Some(user) = repo.get_user(user_id).await? {
                tracing::debug!("dev bypass as {}", user.username);
                return Ok(Some(user.into()));
            }
        }
    }

    let Some(auth_header) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let token = auth_header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            ApiError::Unauthenticated("Authorization header must be a Bearer token.".to_string())
        })?;

    let credentials = CredentialState::from_ref(state);
    let user_id = credentials.verify_access_token(token).map_err(|e| match e {
        CredentialError::Expired => ApiError::Unauthenticated("Token has expired.".to_string()),
        _ => ApiError::Unauthenticated("Given token not valid for any token type.".to_string()),
    })?;

    let user = repo
        .get_user(user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::Unauthenticated("User not found.".to_string()))?;

    tracing::debug!(user = %user.username, staff = user.is_staff(), "token accepted");
    Ok(Some(user.into()))
}

/// AuthUser Extractor Implementation
///
/// Rejects with 401 when the request carries no usable credentials.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    CredentialState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        resolve(parts, state)
            .await?
            .ok_or_else(ApiError::unauthenticated)
    }
}

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    CredentialState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Actor(resolve(parts, state).await?))
    }
}
