use crate::{AppState, handlers::{self, catalog}};
use axum::{
    Router,
    routing::{delete, get},
};

use handlers::method_not_allowed;

pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        // --- Categories & Genres ---
        // No retrieve or update: the detail path only deletes.
        .route(
            "/v1/categories/",
            get(catalog::list_categories)
                .post(catalog::create_category)
                .fallback(method_not_allowed),
        )
        .route(
            "/v1/categories/{slug}/",
            delete(catalog::delete_category).fallback(method_not_allowed),
        )
        .route(
            "/v1/genres/",
            get(catalog::list_genres)
                .post(catalog::create_genre)
                .fallback(method_not_allowed),
        )
        .route(
            "/v1/genres/{slug}/",
            delete(catalog::delete_genre).fallback(method_not_allowed),
        )
        // --- Titles ---
        // GET /v1/titles/?name=&year=&category=&genre=
        .route(
            "/v1/titles/",
            get(catalog::list_titles)
                .post(catalog::create_title)
                .fallback(method_not_allowed),
        )
        .route(
            "/v1/titles/{title_id}/",
            get(catalog::get_title)
                .patch(catalog::update_title)
                .delete(catalog::delete_title)
                .fallback(method_not_allowed),
        )
}
