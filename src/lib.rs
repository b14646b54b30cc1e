use std::sync::Arc;

use axum::{Router, extract::FromRef, http::HeaderName, routing::get};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod credentials;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod mail;
pub mod models;
pub mod pagination;
pub mod permissions;
pub mod repository;
pub mod validation;

// One router per resource family.
pub mod routes;
use routes::{auth::auth_routes, catalog::catalog_routes, reviews::review_routes, users::user_routes};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use credentials::{CredentialState, JwtCredentialIssuer};
pub use mail::{MailerState, MemoryMailer, SmtpMailer};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// Auto-generated OpenAPI document, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::auth::signup, handlers::auth::get_token,
        handlers::users::list_users, handlers::users::create_user, handlers::users::get_user,
        handlers::users::update_user, handlers::users::delete_user,
        handlers::catalog::list_categories, handlers::catalog::create_category,
        handlers::catalog::delete_category, handlers::catalog::list_genres,
        handlers::catalog::create_genre, handlers::catalog::delete_genre,
        handlers::catalog::list_titles, handlers::catalog::get_title,
        handlers::catalog::create_title, handlers::catalog::update_title,
        handlers::catalog::delete_title,
        handlers::reviews::list_reviews, handlers::reviews::get_review,
        handlers::reviews::create_review, handlers::reviews::update_review,
        handlers::reviews::delete_review,
        handlers::reviews::list_comments, handlers::reviews::get_comment,
        handlers::reviews::create_comment, handlers::reviews::update_comment,
        handlers::reviews::delete_comment,
    ),
    components(
        schemas(
            models::Role, models::SignupRequest, models::SignupResponse, models::TokenRequest,
            models::TokenResponse, models::CreateUserRequest, models::UpdateUserRequest,
            models::UserResponse, models::CreateTermRequest, models::TermResponse,
            models::TitleWriteRequest, models::TitleResponse, models::ReviewWriteRequest,
            models::ReviewResponse, models::CommentWriteRequest, models::CommentResponse,
        )
    ),
    tags(
        (name = "yamdb", description = "Titles, reviews and ratings API")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// The single, cloneable container of every service a handler may need.
#[derive(Clone)]
pub struct AppState {
    /// Persistence: Postgres in production, in-memory for local runs and tests.
    pub repo: RepositoryState,
    /// Confirmation codes and access tokens.
    pub credentials: CredentialState,
    /// Outgoing mail.
    pub mailer: MailerState,
    pub config: AppConfig,
}

impl AppState {
    /// Local wiring: in-memory store, logged mail, JWTs keyed by the configured secret.
    pub fn in_memory(config: AppConfig) -> Self {
        Self::with_mailer(config, Arc::new(MemoryMailer::new()))
    }

    pub fn with_mailer(config: AppConfig, mailer: MailerState) -> Self {
        Self {
            repo: Arc::new(InMemoryRepository::new()),
            credentials: Arc::new(JwtCredentialIssuer::from_config(&config)),
            mailer,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for CredentialState {
    fn from_ref(app_state: &AppState) -> CredentialState {
        app_state.credentials.clone()
    }
}

impl FromRef<AppState> for MailerState {
    fn from_ref(app_state: &AppState) -> MailerState {
        app_state.mailer.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles every route, the API docs and the observability layers around the state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(handlers::health))
        .merge(auth_routes())
        .merge(user_routes())
        .merge(catalog_routes())
        .merge(review_routes())
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. A UUID for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. One span per request, tagged with the request ID.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Echo x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the `http_request` span with method, URI and the `x-request-id` header,
/// so every log line of a request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
