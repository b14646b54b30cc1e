use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    Comment, NewComment, NewReview, NewTerm, NewTitle, NewUser, Review, Taxonomy, Term, Title,
    TitleChanges, TitleFilter, User, UserChanges,
};

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

/// RepositoryError
///
/// Failures a persistence backend can report. Unique-constraint violations carry the
/// constraint name so callers can turn them into field-level validation errors.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(error: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &error {
            if db.is_unique_violation() {
                let constraint = db.constraint().unwrap_or("unknown").to_string();
                return RepositoryError::UniqueViolation(constraint);
            }
        }
        tracing::error!("database error: {:?}", error);
        RepositoryError::Database(error)
    }
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// One page of a collection plus the size of the whole (filtered) collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: i64,
}

/// 1-based page number and page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.max(1),
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }
}

/// Repository Trait
///
/// The abstract contract for all persistence operations. Handlers talk to this trait
/// only; the backend supplies uniqueness constraints, cascade/nullify-on-delete and the
/// rating aggregate.
///
/// **Send + Sync + async_trait** make `Arc<dyn Repository>` shareable across Axum tasks.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: i64) -> RepoResult<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> RepoResult<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    // Ordered by username; `search` matches a username substring, case-insensitively.
    async fn list_users(&self, search: Option<String>, page: PageRequest) -> RepoResult<Paged<User>>;
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;
    async fn update_user(&self, id: i64, changes: UserChanges) -> RepoResult<Option<User>>;
    // Cascades to the user's reviews and comments.
    async fn delete_user(&self, id: i64) -> RepoResult<bool>;

    // --- Categories & Genres ---
    async fn list_terms(
        &self,
        taxonomy: Taxonomy,
        search: Option<String>,
        page: PageRequest,
    ) -> RepoResult<Paged<Term>>;
    async fn get_term(&self, taxonomy: Taxonomy, slug: &str) -> RepoResult<Option<Term>>;
    async fn create_term(&self, taxonomy: Taxonomy, term: NewTerm) -> RepoResult<Term>;
    // Categories: referencing titles lose their category. Genres: memberships are removed.
    async fn delete_term(&self, taxonomy: Taxonomy, slug: &str) -> RepoResult<bool>;

    // --- Titles ---
    async fn list_titles(&self, filter: TitleFilter, page: PageRequest) -> RepoResult<Paged<Title>>;
    async fn get_title(&self, id: i64) -> RepoResult<Option<Title>>;
    async fn create_title(&self, title: NewTitle) -> RepoResult<Title>;
    async fn update_title(&self, id: i64, changes: TitleChanges) -> RepoResult<Option<Title>>;
    // Cascades to reviews (and their comments) and genre memberships.
    async fn delete_title(&self, id: i64) -> RepoResult<bool>;

    // --- Reviews ---
    async fn list_reviews(&self, title_id: i64, page: PageRequest) -> RepoResult<Paged<Review>>;
    async fn get_review(&self, title_id: i64, id: i64) -> RepoResult<Option<Review>>;
    async fn review_exists(&self, title_id: i64, author_id: i64) -> RepoResult<bool>;
    // Fails with UniqueViolation("unique_title_author") on a duplicate (title, author).
    async fn create_review(&self, review: NewReview) -> RepoResult<Review>;
    async fn update_review(
        &self,
        id: i64,
        text: Option<String>,
        score: Option<i32>,
    ) -> RepoResult<Option<Review>>;
    // Cascades to the review's comments.
    async fn delete_review(&self, id: i64) -> RepoResult<bool>;

    // --- Comments ---
    async fn list_comments(&self, review_id: i64, page: PageRequest) -> RepoResult<Paged<Comment>>;
    async fn get_comment(&self, review_id: i64, id: i64) -> RepoResult<Option<Comment>>;
    async fn create_comment(&self, comment: NewComment) -> RepoResult<Comment>;
    async fn update_comment(&self, id: i64, text: String) -> RepoResult<Option<Comment>>;
    async fn delete_comment(&self, id: i64) -> RepoResult<bool>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;
