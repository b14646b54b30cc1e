use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use validator::Validate;

use crate::validation::{SLUG_REGEX, USERNAME_REGEX};

// --- Roles & Capabilities ---

/// Role
///
/// The RBAC field stored on every account. Serialized in lowercase on the wire
/// and in the `users.role` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    User,
    Moderator,
    Admin,
}

/// Capabilities
///
/// Boolean flags derived from a role. Nothing else feeds into them; the superuser
/// flag is combined separately where a check calls for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub is_user: bool,
    pub is_moderator: bool,
    pub is_admin: bool,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::User, Role::Moderator, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }

    pub const fn capabilities(self) -> Capabilities {
        Capabilities {
            is_user: matches!(self, Role::User),
            is_moderator: matches!(self, Role::Moderator),
            is_admin: matches!(self, Role::Admin),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// Canonical account record from the `users` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub is_superuser: bool,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
}

impl User {
    pub fn capabilities(&self) -> Capabilities {
        self.role.capabilities()
    }

    /// Staff status follows the role; superusers are always staff.
    pub fn is_staff(&self) -> bool {
        !self.capabilities().is_user || self.is_superuser
    }
}

/// Term
///
/// A slug-addressed classifier row. Categories and genres share this shape and
/// live in separate tables.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Term {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

pub type Category = Term;
pub type Genre = Term;

/// Taxonomy
///
/// Selects which classifier table a term operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Taxonomy {
    Category,
    Genre,
}

impl Taxonomy {
    pub fn table(&self) -> &'static str {
        match self {
            Taxonomy::Category => "categories",
            Taxonomy::Genre => "genres",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Taxonomy::Category => "Category",
            Taxonomy::Genre => "Genre",
        }
    }
}

/// Title
///
/// A title with its category and genres resolved and its rating aggregated.
#[derive(Debug, Clone, PartialEq)]
pub struct Title {
    pub id: i64,
    pub name: String,
    pub year: i32,
    pub description: String,
    pub category: Option<Category>,
    pub genres: Vec<Genre>,
    /// Mean review score; `None` while the title has no reviews.
    pub rating: Option<f64>,
}

/// Review
///
/// Row from the `reviews` table joined with the author's username.
#[derive(Debug, Clone, FromRow, PartialEq)]
pub struct Review {
    pub id: i64,
    pub title_id: i64,
    pub author_id: i64,
    pub author: String,
    pub text: String,
    pub score: i32,
    pub pub_date: DateTime<Utc>,
}

/// Comment
///
/// Row from the `comments` table joined with the author's username.
#[derive(Debug, Clone, FromRow, PartialEq)]
pub struct Comment {
    pub id: i64,
    pub review_id: i64,
    pub author_id: i64,
    pub author: String,
    pub text: String,
    pub pub_date: DateTime<Utc>,
}

// --- Persistence Inputs ---

#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub role: Role,
    pub is_superuser: bool,
}

/// Partial account update; `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub role: Option<Role>,
    pub is_superuser: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct NewTerm {
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone)]
pub struct NewTitle {
    pub name: String,
    pub year: i32,
    pub description: String,
    pub category_id: Option<i64>,
    pub genre_ids: Vec<i64>,
}

/// Partial title update. `genre_ids: Some(..)` replaces the whole genre set.
#[derive(Debug, Clone, Default)]
pub struct TitleChanges {
    pub name: Option<String>,
    pub year: Option<i32>,
    pub description: Option<String>,
    pub category_id: Option<Option<i64>>,
    pub genre_ids: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TitleFilter {
    /// Case-insensitive substring of the title name.
    pub name: Option<String>,
    pub year: Option<i32>,
    /// Category slug.
    pub category: Option<String>,
    /// Genre slug.
    pub genre: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub title_id: i64,
    pub author_id: i64,
    pub text: String,
    pub score: i32,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub review_id: i64,
    pub author_id: i64,
    pub text: String,
}

// --- Request Payloads (Input Schemas) ---

/// SignupRequest
///
/// Input payload for POST /v1/auth/signup/.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SignupRequest {
    #[validate(
        length(min = 1, max = 150, message = "Ensure this field has no more than 150 characters."),
        regex(path = *USERNAME_REGEX, message = "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.")
    )]
    pub username: String,
    #[validate(
        email(message = "Enter a valid email address."),
        length(max = 254, message = "Ensure this field has no more than 254 characters.")
    )]
    pub email: String,
}

/// TokenRequest
///
/// Input payload for POST /v1/auth/token/.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub confirmation_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct TokenResponse {
    pub token: String,
}

/// CreateUserRequest
///
/// Admin payload for POST /v1/users/.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(
        length(min = 1, max = 150, message = "Ensure this field has no more than 150 characters."),
        regex(path = *USERNAME_REGEX, message = "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.")
    )]
    pub username: String,
    #[validate(
        email(message = "Enter a valid email address."),
        length(max = 254, message = "Ensure this field has no more than 254 characters.")
    )]
    pub email: String,
    #[serde(default)]
    #[validate(length(max = 150, message = "Ensure this field has no more than 150 characters."))]
    pub first_name: String,
    #[serde(default)]
    #[validate(length(max = 150, message = "Ensure this field has no more than 150 characters."))]
    pub last_name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub role: Role,
}

/// UpdateUserRequest
///
/// Partial update payload for PATCH /v1/users/{username}/ (including the alias).
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(
        length(min = 1, max = 150, message = "Ensure this field has no more than 150 characters."),
        regex(path = *USERNAME_REGEX, message = "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.")
    )]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(
        email(message = "Enter a valid email address."),
        length(max = 254, message = "Ensure this field has no more than 254 characters.")
    )]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 150, message = "Ensure this field has no more than 150 characters."))]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 150, message = "Ensure this field has no more than 150 characters."))]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

/// CreateTermRequest
///
/// Payload for POST /v1/categories/ and POST /v1/genres/.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateTermRequest {
    #[validate(length(min = 1, max = 256, message = "Name must be 1-256 characters."))]
    pub name: String,
    #[validate(
        length(min = 1, max = 50, message = "Slug must be 1-50 characters."),
        regex(path = *SLUG_REGEX, message = "Enter a valid slug consisting of letters, numbers, underscores or hyphens.")
    )]
    pub slug: String,
}

/// TitleWriteRequest
///
/// Write representation of a title: category and genres referenced by slug.
/// Required fields are enforced on create; on PATCH every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct TitleWriteRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ReviewWriteRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CommentWriteRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

// --- Output Schemas ---

/// UserResponse
///
/// Wire representation of an account. Internal flags stay server-side.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, PartialEq)]
#[ts(export)]
pub struct UserResponse {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub role: Role,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            username: u.username,
            email: u.email,
            first_name: u.first_name,
            last_name: u.last_name,
            bio: u.bio,
            role: u.role,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, PartialEq)]
#[ts(export)]
pub struct SignupResponse {
    pub username: String,
    pub email: String,
}

/// TermResponse
///
/// Category/genre as sent to clients: the numeric id is omitted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, PartialEq, Eq)]
#[ts(export)]
pub struct TermResponse {
    pub name: String,
    pub slug: String,
}

impl From<Term> for TermResponse {
    fn from(t: Term) -> Self {
        Self {
            name: t.name,
            slug: t.slug,
        }
    }
}

/// TitleResponse
///
/// Read representation: category and genres expanded, rating aggregated.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, PartialEq)]
#[ts(export)]
pub struct TitleResponse {
    pub id: i64,
    pub name: String,
    pub year: i32,
    pub description: String,
    pub genre: Vec<TermResponse>,
    pub category: Option<TermResponse>,
    pub rating: Option<f64>,
}

impl From<Title> for TitleResponse {
    fn from(t: Title) -> Self {
        Self {
            id: t.id,
            name: t.name,
            year: t.year,
            description: t.description,
            genre: t.genres.into_iter().map(TermResponse::from).collect(),
            category: t.category.map(TermResponse::from),
            rating: t.rating,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, PartialEq)]
#[ts(export)]
pub struct ReviewResponse {
    pub id: i64,
    pub text: String,
    /// Author's username.
    pub author: String,
    pub score: i32,
    #[ts(type = "string")]
    pub pub_date: DateTime<Utc>,
}

impl From<Review> for ReviewResponse {
    fn from(r: Review) -> Self {
        Self {
            id: r.id,
            text: r.text,
            author: r.author,
            score: r.score,
            pub_date: r.pub_date,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, PartialEq)]
#[ts(export)]
pub struct CommentResponse {
    pub id: i64,
    pub text: String,
    pub author: String,
    #[ts(type = "string")]
    pub pub_date: DateTime<Utc>,
}

impl From<Comment> for CommentResponse {
    fn from(c: Comment) -> Self {
        Self {
            id: c.id,
            text: c.text,
            author: c.author,
            pub_date: c.pub_date,
        }
    }
}
