use chrono::{Datelike, Utc};
use lazy_static::lazy_static;
use regex::Regex;

use crate::config::ApiSettings;
use crate::error::{ApiError, FieldErrors};

lazy_static! {
    /// Usernames: letters, digits and `@ . + - _` (Unicode letters allowed).
    /// - Valid: "john_doe", "jane.doe@home", "ü-ser+1"
    /// - Invalid: "john doe", "john/doe", ""
    pub static ref USERNAME_REGEX: Regex = Regex::new(r"^[\w.@+-]+$").unwrap();

    /// Slugs: ASCII letters, digits, hyphens and underscores.
    pub static ref SLUG_REGEX: Regex = Regex::new(r"^[-a-zA-Z0-9_]+$").unwrap();
}

/// Collects field errors so several checks can report together.
#[derive(Debug, Default)]
pub struct Report {
    errors: FieldErrors,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Folds the outcome of a single-field check into the report.
    pub fn check(&mut self, result: Result<(), ApiError>) {
        if let Err(ApiError::Validation(fields)) = result {
            for (field, messages) in fields {
                self.errors.entry(field).or_default().extend(messages);
            }
        }
    }

    /// Unwraps a required string field, recording an error when it is missing or empty.
    pub fn required(&mut self, field: &str, value: Option<String>) -> String {
        match value {
            Some(v) if !v.is_empty() => v,
            _ => {
                self.add(field, "This field is required.");
                String::new()
            }
        }
    }

    pub fn merge(&mut self, result: Result<(), validator::ValidationErrors>) {
        if let Err(errors) = result {
            self.check(Err(ApiError::from(errors)));
        }
    }

    pub fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self.errors))
        }
    }
}

pub fn validate_score(score: i32, settings: &ApiSettings) -> Result<(), ApiError> {
    if (settings.min_score..=settings.max_score).contains(&score) {
        Ok(())
    } else {
        Err(ApiError::field(
            "score",
            format!(
                "Score must be between {} and {}.",
                settings.min_score, settings.max_score
            ),
        ))
    }
}

/// The alias token can never be a real username. Exact, case-sensitive match.
pub fn validate_username_not_alias(username: &str, settings: &ApiSettings) -> Result<(), ApiError> {
    if username == settings.me_alias {
        Err(ApiError::field(
            "username",
            format!("Name \"{}\" is forbidden.", settings.me_alias),
        ))
    } else {
        Ok(())
    }
}

pub fn validate_year(year: i32) -> Result<(), ApiError> {
    let current = Utc::now().year();
    if year < 0 {
        Err(ApiError::field("year", "Ensure this value is greater than or equal to 0."))
    } else if year > current {
        Err(ApiError::field(
            "year",
            format!("Ensure this value is less than or equal to {current}."),
        ))
    } else {
        Ok(())
    }
}

pub fn validate_required_text(field: &str, value: Option<&str>) -> Result<(), ApiError> {
    match value {
        None => Err(ApiError::field(field, "This field is required.")),
        Some(v) => validate_not_blank(field, v),
    }
}

pub fn validate_not_blank(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        Err(ApiError::field(field, "This field may not be blank."))
    } else {
        Ok(())
    }
}
