use crate::{AppState, handlers::{self, reviews}};
use axum::{Router, routing::get};

use handlers::method_not_allowed;

pub fn review_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/titles/{title_id}/reviews/",
            get(reviews::list_reviews)
                .post(reviews::create_review)
                .fallback(method_not_allowed),
        )
        .route(
            "/v1/titles/{title_id}/reviews/{review_id}/",
            get(reviews::get_review)
                .patch(reviews::update_review)
                .delete(reviews::delete_review)
                .fallback(method_not_allowed),
        )
        .route(
            "/v1/titles/{title_id}/reviews/{review_id}/comments/",
            get(reviews::list_comments)
                .post(reviews::create_comment)
                .fallback(method_not_allowed),
        )
        .route(
            "/v1/titles/{title_id}/reviews/{review_id}/comments/{comment_id}/",
            get(reviews::get_comment)
                .patch(reviews::update_comment)
                .delete(reviews::delete_comment)
                .fallback(method_not_allowed),
        )
}
