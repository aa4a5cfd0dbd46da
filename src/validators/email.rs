use regex::Regex;
use std::sync::LazyLock;

use crate::AuthError;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap()
});

pub fn validate_email(email: &str) -> Result<(), AuthError> {
    if email.is_empty() {
        return Err(AuthError::Validation("Email cannot be empty".to_owned()));
    }

    if email.len() > 254 {
        return Err(AuthError::Validation(
            "Email is too long (max 254 characters)".to_owned(),
        ));
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err(AuthError::InvalidEmail);
    }

    Ok(())
}
