use crate::{AppState, handlers};
use axum::{Router, routing::post};

use handlers::method_not_allowed;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        // POST /v1/auth/signup/
        // Creates the account if needed and mails a confirmation code.
        .route(
            "/v1/auth/signup/",
            post(handlers::auth::signup).fallback(method_not_allowed),
        )
        // POST /v1/auth/token/
        // Exchanges username + confirmation code for an access token.
        .route(
            "/v1/auth/token/",
            post(handlers::auth::get_token).fallback(method_not_allowed),
        )
}
