use crate::AuthError;

/// Maximum length of an impersonation reason.
const MAX_REASON_LENGTH: usize = 500;

/// Validates the free-text reason recorded with every impersonation.
///
/// The reason lands in the audit row, so an empty or whitespace-only
/// value is rejected before anything is persisted.
pub fn validate_reason(reason: &str) -> Result<(), AuthError> {
    if reason.trim().is_empty() {
        return Err(AuthError::Validation(
            "A reason is required to impersonate a user".to_owned(),
        ));
    }

    if reason.len() > MAX_REASON_LENGTH {
        return Err(AuthError::Validation(
            "Reason is too long (max 500 characters)".to_owned(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_reason() {
        assert!(validate_reason("investigating billing ticket #4821").is_ok());
    }

    #[test]
    fn test_empty_reason() {
        assert!(validate_reason("").is_err());
        assert!(validate_reason("   ").is_err());
    }

    #[test]
    fn test_reason_too_long() {
        assert!(validate_reason(&"x".repeat(501)).is_err());
        assert!(validate_reason(&"x".repeat(500)).is_ok());
    }
}
