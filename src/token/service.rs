use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccessClaims, AssuranceLevel, TokenConfig, TokenType};
use crate::crypto::generate_token;
use crate::roles::Role;
use crate::AuthError;

/// Length of the token ID (jti).
const JTI_LENGTH: usize = 16;

/// A pair of access and refresh tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived access token for API requests.
    pub access_token: String,
    /// Long-lived refresh token for obtaining new access tokens.
    pub refresh_token: String,
    /// Access token expiry in seconds.
    pub expires_in: i64,
}

/// Service for encoding and decoding credentials.
///
/// The in-memory identity platform uses this to mint sessions; the client
/// side uses `decode` to introspect the acting-as claim.
#[derive(Clone)]
pub struct TokenService {
    config: TokenConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenService {
    /// Creates a new token service with the given configuration.
    pub fn new(config: TokenConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    fn encode(&self, claims: &AccessClaims) -> Result<String, AuthError> {
        jsonwebtoken::encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|_| AuthError::TokenInvalid)
    }

    fn build_claims(
        user_id: Uuid,
        token_type: TokenType,
        expires_at: DateTime<Utc>,
        aal: AssuranceLevel,
        role: Option<Role>,
        acting_as: Option<Uuid>,
    ) -> AccessClaims {
        AccessClaims {
            sub: user_id.to_string(),
            exp: expires_at.timestamp(),
            iat: Utc::now().timestamp(),
            jti: generate_token(JTI_LENGTH),
            token_type,
            aal,
            act: acting_as.map(|id| id.to_string()),
            role: role.map(|r| r.as_str().to_owned()),
        }
    }

    /// Creates an access + refresh pair for an ordinary session.
    pub fn create_pair(
        &self,
        user_id: Uuid,
        aal: AssuranceLevel,
        role: Option<Role>,
    ) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let access = Self::build_claims(
            user_id,
            TokenType::Access,
            now + self.config.access_expiry(),
            aal,
            role,
            None,
        );
        let refresh = Self::build_claims(
            user_id,
            TokenType::Refresh,
            now + self.config.refresh_expiry(),
            aal,
            role,
            None,
        );

        Ok(TokenPair {
            access_token: self.encode(&access)?,
            refresh_token: self.encode(&refresh)?,
            expires_in: self.config.access_expiry().num_seconds(),
        })
    }

    /// Creates a scoped credential pair carrying an acting-as claim.
    ///
    /// Both tokens expire at `expires_at`: a scoped credential must not
    /// outlive the impersonation it authorizes.
    pub fn create_scoped_pair(
        &self,
        admin_id: Uuid,
        target_id: Uuid,
        expires_at: DateTime<Utc>,
        role: Option<Role>,
    ) -> Result<TokenPair, AuthError> {
        let access = Self::build_claims(
            admin_id,
            TokenType::Access,
            expires_at,
            AssuranceLevel::Aal2,
            role,
            Some(target_id),
        );
        let refresh = Self::build_claims(
            admin_id,
            TokenType::Refresh,
            expires_at,
            AssuranceLevel::Aal2,
            role,
            Some(target_id),
        );

        let expires_in = (expires_at - Utc::now()).num_seconds().max(0);

        Ok(TokenPair {
            access_token: self.encode(&access)?,
            refresh_token: self.encode(&refresh)?,
            expires_in,
        })
    }

    /// Exchanges a valid refresh token for a new pair, preserving the
    /// assurance level, role, and acting-as claims.
    pub fn rotate(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.decode(refresh_token)?;

        if !claims.is_refresh_token() {
            return Err(AuthError::TokenInvalid);
        }

        let user_id = claims.user_id()?;
        let role = claims.role.as_deref().and_then(Role::from_str);

        match claims.acting_as()? {
            // Scoped pairs keep their original absolute expiry.
            Some(target) => {
                let expires_at = DateTime::from_timestamp(claims.exp, 0)
                    .ok_or(AuthError::TokenInvalid)?;
                self.create_scoped_pair(user_id, target, expires_at, role)
            }
            None => self.create_pair(user_id, claims.aal, role),
        }
    }

    /// Decodes and validates a token, returning the claims.
    pub fn decode(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);

        let token_data =
            jsonwebtoken::decode::<AccessClaims>(token, &self.decoding_key, &validation).map_err(
                |e| match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                    _ => AuthError::TokenInvalid,
                },
            )?;

        Ok(token_data.claims)
    }

    /// Validates an access token and returns its claims.
    ///
    /// Refresh tokens are rejected here.
    pub fn validate_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let claims = self.decode(token)?;

        if !claims.is_access_token() {
            return Err(AuthError::TokenInvalid);
        }

        Ok(claims)
    }

    /// Returns the configured access token expiry duration.
    pub fn access_expiry(&self) -> Duration {
        self.config.access_expiry()
    }
}
