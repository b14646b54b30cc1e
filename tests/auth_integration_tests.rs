use axum::{
    extract::FromRequestParts,
    http::{Method, Request, StatusCode, Uri, header, request::Parts},
};
use yamdb_api::{
    AppState,
    auth::{Actor, AuthUser, DEV_USER_HEADER},
    config::{AppConfig, Env},
    credentials::{CredentialIssuer, JwtCredentialIssuer},
    error::ApiError,
    models::{NewUser, Role, User},
};

const TEST_JWT_SECRET: &str = "auth-integration-secret";

// --- Helpers ---

fn create_app_state(env: Env) -> AppState {
    let config = AppConfig {
        env,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        ..AppConfig::default()
    };
    AppState::in_memory(config)
}

async fn seed_user(state: &AppState, username: &str, role: Role) -> User {
    state
        .repo
        .create_user(NewUser {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            role,
            ..Default::default()
        })
        .await
        .expect("seed user")
}

/// Helper to get the mutable Parts struct from a generated Request
fn get_request_parts(method: Method, uri: Uri) -> Parts {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let (parts, _) = request.into_parts();
    parts
}

fn with_bearer(mut parts: Parts, token: &str) -> Parts {
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
    parts
}

// --- Tests ---

#[tokio::test]
async fn test_auth_success_with_valid_jwt() {
    let app_state = create_app_state(Env::Production);
    let user = seed_user(&app_state, "reader", Role::Moderator).await;
    let token = app_state.credentials.issue_access_token(&user).unwrap();

    let mut parts = with_bearer(get_request_parts(Method::GET, "/".parse().unwrap()), &token);

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(auth_user.id, user.id);
    assert_eq!(auth_user.username, "reader");
    assert_eq!(auth_user.role, Role::Moderator);
    assert!(!auth_user.is_admin_or_superuser());
}

#[tokio::test]
async fn test_auth_failure_with_missing_header() {
    let app_state = create_app_state(Env::Production);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());

    let err = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_actor_is_anonymous_without_credentials() {
    let app_state = create_app_state(Env::Production);
    let mut parts = get_request_parts(Method::GET, "/v1/titles/".parse().unwrap());

    let Actor(actor) = Actor::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert!(actor.is_none());
}

#[tokio::test]
async fn test_actor_rejects_garbage_token() {
    let app_state = create_app_state(Env::Production);
    let mut parts = with_bearer(
        get_request_parts(Method::GET, "/v1/titles/".parse().unwrap()),
        "not-a-jwt",
    );

    let err = Actor::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_with_expired_jwt() {
    let app_state = create_app_state(Env::Production);
    let user = seed_user(&app_state, "late", Role::User).await;
    let expired = JwtCredentialIssuer::new(TEST_JWT_SECRET, -120, 60)
        .issue_access_token(&user)
        .unwrap();

    let mut parts = with_bearer(get_request_parts(Method::GET, "/".parse().unwrap()), &expired);

    match AuthUser::from_request_parts(&mut parts, &app_state).await {
        Err(ApiError::Unauthenticated(detail)) => assert_eq!(detail, "Token has expired."),
        other => panic!("expected an expired-token rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_confirmation_code_is_not_an_access_token() {
    let app_state = create_app_state(Env::Production);
    let user = seed_user(&app_state, "sneaky", Role::User).await;
    let code = app_state.credentials.make_confirmation_code(&user).unwrap();

    let mut parts = with_bearer(get_request_parts(Method::GET, "/".parse().unwrap()), &code);

    let err = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_for_deleted_user_is_rejected() {
    let app_state = create_app_state(Env::Production);
    let user = seed_user(&app_state, "ghost", Role::User).await;
    let token = app_state.credentials.issue_access_token(&user).unwrap();
    assert!(app_state.repo.delete_user(user.id).await.unwrap());

    let mut parts = with_bearer(get_request_parts(Method::GET, "/".parse().unwrap()), &token);

    let err = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_role_is_read_from_store_not_token() {
    let app_state = create_app_state(Env::Production);
    let user = seed_user(&app_state, "climber", Role::User).await;
    let token = app_state.credentials.issue_access_token(&user).unwrap();

    app_state
        .repo
        .update_user(
            user.id,
            yamdb_api::models::UserChanges {
                role: Some(Role::Admin),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let mut parts = with_bearer(get_request_parts(Method::GET, "/".parse().unwrap()), &token);
    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(auth_user.role, Role::Admin);
}

#[tokio::test]
async fn test_local_bypass_success() {
    let app_state = create_app_state(Env::Local);
    let user = seed_user(&app_state, "dev", Role::Admin).await;

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        DEV_USER_HEADER,
        header::HeaderValue::from_str(&user.id.to_string()).unwrap(),
    );

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(auth_user.id, user.id);
    assert_eq!(auth_user.role, Role::Admin);
}

#[tokio::test]
async fn test_local_bypass_ignored_in_production() {
    let app_state = create_app_state(Env::Production);
    let user = seed_user(&app_state, "dev", Role::Admin).await;

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        DEV_USER_HEADER,
        header::HeaderValue::from_str(&user.id.to_string()).unwrap(),
    );

    let err = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_local_bypass_for_unknown_id_falls_through() {
    let app_state = create_app_state(Env::Local);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts
        .headers
        .insert(DEV_USER_HEADER, header::HeaderValue::from_static("4242"));

    let Actor(actor) = Actor::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert!(actor.is_none());
}
