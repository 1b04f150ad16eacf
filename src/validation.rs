use lazy_static::lazy_static;
use regex::Regex;

use crate::{error::AppError, users::repo_types::Role};

const EMAIL_MAX: usize = 100;
const NAME_MIN: usize = 2;
const NAME_MAX: usize = 50;
const QUERY_MAX: usize = 100;
pub const PAGE_LIMIT_MAX: usize = 100;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref NAME_RE: Regex = Regex::new(r"^[a-zA-Z\s]+$").unwrap();
    static ref QUERY_RE: Regex = Regex::new(r"^[a-zA-Z0-9\s@._-]+$").unwrap();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Trim, lower-case and check an email address.
pub fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::Validation("Email is required".into()));
    }
    if email.len() > EMAIL_MAX || !is_valid_email(&email) {
        return Err(AppError::Validation("Please provide a valid email".into()));
    }
    Ok(email)
}

pub fn validate_name(raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    let len = name.chars().count();
    if len == 0 {
        return Err(AppError::Validation("Name is required".into()));
    }
    if !(NAME_MIN..=NAME_MAX).contains(&len) {
        return Err(AppError::Validation(
            "Name must be between 2 and 50 characters".into(),
        ));
    }
    if !NAME_RE.is_match(name) {
        return Err(AppError::Validation(
            "Name can only contain letters and spaces".into(),
        ));
    }
    Ok(name.to_string())
}

pub fn validate_role(raw: &str) -> Result<Role, AppError> {
    raw.trim().parse::<Role>().map_err(AppError::Validation)
}

pub fn validate_search_query(raw: &str) -> Result<String, AppError> {
    let q = raw.trim();
    if q.is_empty() || q.chars().count() > QUERY_MAX {
        return Err(AppError::Validation(
            "Search query must be between 1 and 100 characters".into(),
        ));
    }
    if !QUERY_RE.is_match(q) {
        return Err(AppError::Validation(
            "Search query contains invalid characters".into(),
        ));
    }
    Ok(q.to_string())
}

pub fn validate_page(page: usize, limit: usize) -> Result<(), AppError> {
    if page < 1 {
        return Err(AppError::Validation("Page must be a positive integer".into()));
    }
    if !(1..=PAGE_LIMIT_MAX).contains(&limit) {
        return Err(AppError::Validation("Limit must be between 1 and 100".into()));
    }
    Ok(())
}
