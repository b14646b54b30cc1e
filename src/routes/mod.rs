//! Router Module Index
//!
//! One router per resource family, all mounted under `/v1` with trailing-slash paths.
//! Permission checks live in the handlers (see `permissions`), so no router carries
//! an auth layer. Every method router ends in the `method_not_allowed` fallback,
//! which answers verbs a path does not serve before any authentication runs.

/// Signup and token exchange.
pub mod auth;

/// Accounts, including the `me` alias.
pub mod users;

/// Categories, genres and titles.
pub mod catalog;

/// Reviews and their comments, nested under titles.
pub mod reviews;
