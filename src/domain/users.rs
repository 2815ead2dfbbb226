//! Username rules and display helpers.

use super::error::DomainError;

/// First path segments owned by fixed routes; a user with one of these names
/// would be unreachable at `/<username>/`.
const RESERVED_USERNAMES: &[&str] = &["auth", "follow", "group", "new", "_health", "media"];
const MAX_USERNAME_LEN: usize = 150;

pub fn display_name(first_name: &str, last_name: &str, username: &str) -> String {
    let full = format!("{} {}", first_name.trim(), last_name.trim());
    let full = full.trim();
    if full.is_empty() {
        username.to_string()
    } else {
        full.to_string()
    }
}

/// Validate a username for account creation.
///
/// Allowed characters are ASCII letters, digits and `@ . + - _`.
pub fn validate_username(username: &str) -> Result<(), DomainError> {
    if username.is_empty() {
        return Err(DomainError::validation("username", "must not be empty"));
    }
    if username.len() > MAX_USERNAME_LEN {
        return Err(DomainError::validation(
            "username",
            format!("must be at most {MAX_USERNAME_LEN} characters"),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
    {
        return Err(DomainError::validation(
            "username",
            "may only contain letters, digits and @/./+/-/_",
        ));
    }
    if username.chars().all(|c| c == '.') {
        return Err(DomainError::validation(
            "username",
            "must contain something other than dots",
        ));
    }
    if RESERVED_USERNAMES.contains(&username.to_ascii_lowercase().as_str()) {
        return Err(DomainError::validation("username", "is reserved"));
    }
    Ok(())
}
