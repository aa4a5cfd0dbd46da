//! Boundary to the upstream identity and data platform.
//!
//! Everything the crate needs from the platform goes through the
//! [`IdentityProvider`] trait: session issuance, introspection, refresh,
//! single-use login artifacts, and privileged scoped-credential minting.
//! Methods documented as service-level run under a service credential the
//! client never holds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::crypto::SecretString;
use crate::roles::Role;
use crate::token::{AssuranceLevel, TokenPair};
use crate::AuthError;

#[cfg(feature = "mocks")]
mod mock;

#[cfg(feature = "mocks")]
pub use mock::InMemoryIdentityPlatform;

/// A user as known to the identity platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    /// Platform-level role carried in the user's credentials, if any.
    pub role: Option<Role>,
}

/// Result of introspecting an access token.
#[derive(Debug, Clone)]
pub struct IntrospectedSession {
    /// The authenticated user (the credential's subject).
    pub user: UserSummary,
    /// Assurance level the session was established at.
    pub aal: AssuranceLevel,
    /// The user this credential acts as, when it is a scoped credential.
    pub acting_as: Option<Uuid>,
    /// When the credential expires.
    pub expires_at: DateTime<Utc>,
}

impl IntrospectedSession {
    /// True while the credential carries an acting-as claim.
    pub fn is_impersonating(&self) -> bool {
        self.acting_as.is_some()
    }
}

/// Async boundary to the identity platform.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchanges credentials for a session.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<(TokenPair, UserSummary), AuthError>;

    /// Introspects an access token.
    async fn introspect(&self, access_token: &str) -> Result<IntrospectedSession, AuthError>;

    /// Exchanges a refresh token for a new pair.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError>;

    /// Invalidates a session.
    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError>;

    /// Looks up a user by ID. Service-level.
    async fn find_user(&self, user_id: Uuid) -> Result<Option<UserSummary>, AuthError>;

    /// Looks up a user by email. Service-level.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserSummary>, AuthError>;

    /// Issues a single-use login artifact for a user. Service-level.
    ///
    /// The artifact is a one-time proof of identity; it must be redeemed
    /// promptly and is consumed on redemption.
    async fn issue_login_artifact(&self, user_id: Uuid) -> Result<SecretString, AuthError>;

    /// Redeems a login artifact for a freshly minted session.
    async fn redeem_login_artifact(&self, artifact: &SecretString)
        -> Result<TokenPair, AuthError>;

    /// Mints a scoped credential whose access token carries an acting-as
    /// claim and an absolute expiry. Service-level.
    async fn mint_scoped_credential(
        &self,
        admin_user_id: Uuid,
        target_user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError>;
}

#[async_trait]
impl<P: IdentityProvider + ?Sized> IdentityProvider for Arc<P> {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<(TokenPair, UserSummary), AuthError> {
        (**self).sign_in_with_password(email, password).await
    }

    async fn introspect(&self, access_token: &str) -> Result<IntrospectedSession, AuthError> {
        (**self).introspect(access_token).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        (**self).refresh(refresh_token).await
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        (**self).sign_out(access_token).await
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<UserSummary>, AuthError> {
        (**self).find_user(user_id).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserSummary>, AuthError> {
        (**self).find_user_by_email(email).await
    }

    async fn issue_login_artifact(&self, user_id: Uuid) -> Result<SecretString, AuthError> {
        (**self).issue_login_artifact(user_id).await
    }

    async fn redeem_login_artifact(
        &self,
        artifact: &SecretString,
    ) -> Result<TokenPair, AuthError> {
        (**self).redeem_login_artifact(artifact).await
    }

    async fn mint_scoped_credential(
        &self,
        admin_user_id: Uuid,
        target_user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError> {
        (**self)
            .mint_scoped_credential(admin_user_id, target_user_id, expires_at)
            .await
    }
}

/// Unix-epoch helper for claim expiries coming off the wire.
pub fn expiry_from_timestamp(exp: i64) -> Result<DateTime<Utc>, AuthError> {
    DateTime::from_timestamp(exp, 0).ok_or(AuthError::TokenInvalid)
}

/// Convenience guard: rejects sessions that expired between introspection
/// and use.
pub fn ensure_not_expired(session: &IntrospectedSession) -> Result<(), AuthError> {
    if session.expires_at < Utc::now() {
        return Err(AuthError::TokenExpired);
    }
    Ok(())
}
