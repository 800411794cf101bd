//! Email address checks shared by the dispatcher and the panel client.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ValidationError;

/// One `@`, a non-empty local part, a dotted domain, no whitespace.
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s.]+(\.[^@\s.]+)+$").unwrap());

/// Validate `email` and return its domain (the text after the first `@`).
pub fn domain_of(email: &str) -> Result<&str, ValidationError> {
    if !EMAIL_RE.is_match(email) {
        return Err(ValidationError::InvalidEmail(email.to_string()));
    }
    email
        .split_once('@')
        .map(|(_, domain)| domain)
        .ok_or_else(|| ValidationError::InvalidEmail(email.to_string()))
}
