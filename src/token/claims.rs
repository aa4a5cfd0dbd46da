use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AuthError;

/// Type of token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived access token for API requests.
    Access,
    /// Long-lived refresh token for obtaining new access tokens.
    Refresh,
}

/// Authenticator assurance level.
///
/// `Aal2` means the session satisfied secondary verification; starting an
/// impersonation requires it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssuranceLevel {
    Aal1,
    Aal2,
}

impl AssuranceLevel {
    /// True for sessions that satisfied secondary verification.
    pub fn has_secondary_verification(&self) -> bool {
        matches!(self, Self::Aal2)
    }
}

/// Claims embedded in an access or refresh token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject - the authenticated user ID.
    pub sub: String,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Issued at time (Unix timestamp).
    pub iat: i64,
    /// Unique token ID.
    pub jti: String,
    /// Token type (access or refresh).
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Authenticator assurance level.
    pub aal: AssuranceLevel,
    /// Acting-as claim: the user this credential is authorized to act as.
    ///
    /// Present only on scoped impersonation credentials. While set, the
    /// holder's effective identity is this user, not `sub`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub act: Option<String>,
    /// Platform-level role of the authenticated user, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl AccessClaims {
    /// Returns the authenticated user ID from the claims.
    pub fn user_id(&self) -> Result<Uuid, AuthError> {
        self.sub.parse().map_err(|_| AuthError::TokenInvalid)
    }

    /// Returns the acting-as user ID, if this is a scoped credential.
    pub fn acting_as(&self) -> Result<Option<Uuid>, AuthError> {
        match &self.act {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| AuthError::TokenInvalid),
            None => Ok(None),
        }
    }

    /// True if this is an access token.
    pub fn is_access_token(&self) -> bool {
        self.token_type == TokenType::Access
    }

    /// True if this is a refresh token.
    pub fn is_refresh_token(&self) -> bool {
        self.token_type == TokenType::Refresh
    }

    /// True if the session satisfied secondary verification.
    pub fn has_secondary_verification(&self) -> bool {
        self.aal.has_secondary_verification()
    }
}
