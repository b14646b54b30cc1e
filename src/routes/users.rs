use crate::{AppState, handlers::{self, users}};
use axum::{Router, routing::get};

use handlers::method_not_allowed;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/users/",
            get(users::list_users)
                .post(users::create_user)
                .fallback(method_not_allowed),
        )
        // `{username}` also accepts the `me` alias; PUT is not served.
        .route(
            "/v1/users/{username}/",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user)
                .fallback(method_not_allowed),
        )
}
