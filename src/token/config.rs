use chrono::Duration;
use std::fmt;

use crate::AuthError;

/// Minimum required length for the signing secret in bytes.
pub const MIN_SECRET_LENGTH: usize = 32;

/// Configuration for token generation and validation.
#[derive(Clone)]
pub struct TokenConfig {
    /// Secret key used for signing tokens (HS256).
    pub(crate) secret: String,
    /// Access token expiry duration. Default: 15 minutes.
    pub(crate) access_expiry: Duration,
    /// Refresh token expiry duration. Default: 7 days.
    pub(crate) refresh_expiry: Duration,
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"[REDACTED]")
            .field("access_expiry", &self.access_expiry)
            .field("refresh_expiry", &self.refresh_expiry)
            .finish()
    }
}

impl TokenConfig {
    /// Creates a new token configuration with the given secret.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::ConfigurationError` if the secret is less than
    /// 32 bytes.
    pub fn new(secret: impl Into<String>) -> Result<Self, AuthError> {
        let secret = secret.into();

        if secret.len() < MIN_SECRET_LENGTH {
            return Err(AuthError::ConfigurationError(format!(
                "signing secret must be at least {MIN_SECRET_LENGTH} bytes, got {}",
                secret.len()
            )));
        }

        Ok(Self {
            secret,
            access_expiry: Duration::minutes(15),
            refresh_expiry: Duration::days(7),
        })
    }

    /// Sets the access token expiry duration.
    #[must_use]
    pub fn with_access_expiry(mut self, expiry: Duration) -> Self {
        self.access_expiry = expiry;
        self
    }

    /// Sets the refresh token expiry duration.
    #[must_use]
    pub fn with_refresh_expiry(mut self, expiry: Duration) -> Self {
        self.refresh_expiry = expiry;
        self
    }

    /// Returns the configured access token expiry duration.
    pub fn access_expiry(&self) -> Duration {
        self.access_expiry
    }

    /// Returns the configured refresh token expiry duration.
    pub fn refresh_expiry(&self) -> Duration {
        self.refresh_expiry
    }
}
