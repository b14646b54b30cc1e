use axum::{Json, extract::State};
use validator::Validate;

use crate::{
    AppState,
    error::{ApiError, ApiResult},
    extract::AppJson,
    mail::OutgoingMail,
    models::{NewUser, Role, SignupRequest, SignupResponse, TokenRequest, TokenResponse, User},
    validation::{Report, validate_username_not_alias},
};

/// signup
///
/// [Public Route] Registers an account, or re-issues the code for an existing
/// (username, email) pair, and mails a confirmation code to the address.
/// No session is created.
#[utoipa::path(
    post,
    path = "/v1/auth/signup/",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Confirmation code sent", body = SignupResponse),
        (status = 400, description = "Invalid payload or username/email taken")
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    AppJson(payload): AppJson<SignupRequest>,
) -> ApiResult<Json<SignupResponse>> {
    let mut report = Report::new();
    report.merge(payload.validate());
    report.check(validate_username_not_alias(&payload.username, &state.config.api));
    report.finish()?;

    let user = match state.repo.get_user_by_username(&payload.username).await? {
        Some(existing) if existing.email == payload.email => existing,
        Some(_) => {
            return Err(ApiError::field(
                "username",
                "A user with that username already exists.",
            ));
        }
        None => {
            if state.repo.get_user_by_email(&payload.email).await?.is_some() {
                return Err(ApiError::field(
                    "email",
                    "A user with that email already exists.",
                ));
            }
            let user = state
                .repo
                .create_user(NewUser {
                    username: payload.username.clone(),
                    email: payload.email.clone(),
                    role: Role::User,
                    ..Default::default()
                })
                .await?;
            tracing::info!("New account registered: {}", user.username);
            user
        }
    };

    send_confirmation_code(&state, &user).await?;

    Ok(Json(SignupResponse {
        username: user.username,
        email: user.email,
    }))
}

/// Issues a fresh confirmation code for `user` and mails it.
pub async fn send_confirmation_code(state: &AppState, user: &User) -> ApiResult<()> {
    let code = state
        .credentials
        .make_confirmation_code(user)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    state
        .mailer
        .send(OutgoingMail::confirmation_code(&user.email, &user.username, &code))
        .await
        .map_err(|e| {
            tracing::error!("Failed to mail confirmation code to {}: {}", user.email, e);
            ApiError::Internal(e.to_string())
        })
}

/// get_token
///
/// [Public Route] Exchanges a username and its mailed confirmation code for an
/// access token.
#[utoipa::path(
    post,
    path = "/v1/auth/token/",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Access token", body = TokenResponse),
        (status = 400, description = "Missing fields or wrong code"),
        (status = 404, description = "Unknown username")
    )
)]
pub async fn get_token(
    State(state): State<AppState>,
    AppJson(payload): AppJson<TokenRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let mut report = Report::new();
    let username = report.required("username", payload.username);
    let code = report.required("confirmation_code", payload.confirmation_code);
    report.finish()?;

    let user = state
        .repo
        .get_user_by_username(&username)
        .await?
        .ok_or_else(|| ApiError::not_found("No User matches the given query."))?;

    if !state.credentials.check_confirmation_code(&user, &code) {
        return Err(ApiError::field("confirmation_code", "Invalid confirmation code."));
    }

    let token = state
        .credentials
        .issue_access_token(&user)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    tracing::info!("Access token issued for {}", user.username);
    Ok(Json(TokenResponse { token }))
}
