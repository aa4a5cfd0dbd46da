#![allow(clippy::significant_drop_tightening)]

use std::collections::HashMap;
use std::sync::RwLock;

use argon2::{Argon2, PasswordVerifier};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use password_hash::{PasswordHash, PasswordHasher, SaltString};
use rand::rngs::OsRng;
use uuid::Uuid;

use super::{expiry_from_timestamp, IdentityProvider, IntrospectedSession, UserSummary};
use crate::crypto::{generate_token_default, hash_token, SecretString};
use crate::roles::{parse_role_or_deny, Role};
use crate::token::{AssuranceLevel, TokenConfig, TokenPair, TokenService};
use crate::AuthError;

/// How long a login artifact stays redeemable.
const ARTIFACT_TTL_SECONDS: i64 = 60;

struct StoredUser {
    summary: UserSummary,
    hashed_password: String,
    /// Users enrolled in second-factor verification establish Aal2 sessions.
    second_factor_enrolled: bool,
}

struct ArtifactRecord {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

/// In-memory identity platform.
///
/// Backs the test suite and serves as the reference for what a real
/// platform adapter must do: argon2-hashed passwords, HS256 token pairs,
/// and single-use login artifacts stored by hash and consumed atomically
/// on redemption.
pub struct InMemoryIdentityPlatform {
    users: RwLock<HashMap<Uuid, StoredUser>>,
    artifacts: RwLock<HashMap<String, ArtifactRecord>>,
    tokens: TokenService,
}

impl InMemoryIdentityPlatform {
    /// Creates a platform signing with the given secret (min 32 bytes).
    pub fn new(secret: impl Into<String>) -> Result<Self, AuthError> {
        let config = TokenConfig::new(secret)?;
        Ok(Self {
            users: RwLock::new(HashMap::new()),
            artifacts: RwLock::new(HashMap::new()),
            tokens: TokenService::new(config),
        })
    }

    /// Registers a user. Test setup helper.
    pub fn register_user(
        &self,
        email: &str,
        name: &str,
        password: &str,
        role: Option<Role>,
        second_factor_enrolled: bool,
    ) -> Result<UserSummary, AuthError> {
        let summary = UserSummary {
            id: Uuid::new_v4(),
            email: email.to_owned(),
            name: name.to_owned(),
            role,
        };

        let user = StoredUser {
            summary: summary.clone(),
            hashed_password: hash_password(password)?,
            second_factor_enrolled,
        };

        let mut users = self
            .users
            .write()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
        users.insert(summary.id, user);

        Ok(summary)
    }

    /// Direct access to the token service, for adapters layered on top.
    pub fn token_service(&self) -> &TokenService {
        &self.tokens
    }

    fn assurance_for(&self, user_id: Uuid) -> Result<AssuranceLevel, AuthError> {
        let users = self
            .users
            .read()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
        let user = users.get(&user_id).ok_or(AuthError::UserNotFound)?;
        Ok(if user.second_factor_enrolled {
            AssuranceLevel::Aal2
        } else {
            AssuranceLevel::Aal1
        })
    }

    fn summary_for(&self, user_id: Uuid) -> Result<Option<UserSummary>, AuthError> {
        let users = self
            .users
            .read()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
        Ok(users.get(&user_id).map(|u| u.summary.clone()))
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityPlatform {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<(TokenPair, UserSummary), AuthError> {
        let (summary, hashed, enrolled) = {
            let users = self
                .users
                .read()
                .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
            let user = users
                .values()
                .find(|u| u.summary.email == email)
                .ok_or(AuthError::InvalidCredentials)?;
            (
                user.summary.clone(),
                user.hashed_password.clone(),
                user.second_factor_enrolled,
            )
        };

        if !verify_password(password.expose_secret(), &hashed)? {
            return Err(AuthError::InvalidCredentials);
        }

        let aal = if enrolled {
            AssuranceLevel::Aal2
        } else {
            AssuranceLevel::Aal1
        };

        let pair = self.tokens.create_pair(summary.id, aal, summary.role)?;
        Ok((pair, summary))
    }

    async fn introspect(&self, access_token: &str) -> Result<IntrospectedSession, AuthError> {
        let claims = self.tokens.validate_access(access_token)?;
        let user_id = claims.user_id()?;

        let mut user = self
            .summary_for(user_id)?
            .ok_or(AuthError::UserNotFound)?;

        // the credential's role claim governs this session; an unknown
        // role string denies rather than falling through
        user.role = match claims.role.as_deref() {
            Some(raw) => Some(parse_role_or_deny(raw)?),
            None => None,
        };

        Ok(IntrospectedSession {
            user,
            aal: claims.aal,
            acting_as: claims.acting_as()?,
            expires_at: expiry_from_timestamp(claims.exp)?,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        self.tokens.rotate(refresh_token)
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), AuthError> {
        // Stateless tokens: nothing to revoke in the in-memory platform.
        Ok(())
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<UserSummary>, AuthError> {
        self.summary_for(user_id)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserSummary>, AuthError> {
        let users = self
            .users
            .read()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
        Ok(users
            .values()
            .find(|u| u.summary.email == email)
            .map(|u| u.summary.clone()))
    }

    async fn issue_login_artifact(&self, user_id: Uuid) -> Result<SecretString, AuthError> {
        if self.summary_for(user_id)?.is_none() {
            return Err(AuthError::UserNotFound);
        }

        let token = generate_token_default();
        let record = ArtifactRecord {
            user_id,
            expires_at: Utc::now() + Duration::seconds(ARTIFACT_TTL_SECONDS),
        };

        let mut artifacts = self
            .artifacts
            .write()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
        artifacts.insert(hash_token(&token), record);

        Ok(SecretString::new(token))
    }

    async fn redeem_login_artifact(
        &self,
        artifact: &SecretString,
    ) -> Result<TokenPair, AuthError> {
        let user_id = {
            let mut artifacts = self
                .artifacts
                .write()
                .map_err(|_| AuthError::Internal("lock poisoned".into()))?;

            // Removal consumes the artifact: single use, even on failure paths.
            let record = artifacts
                .remove(&hash_token(artifact.expose_secret()))
                .ok_or(AuthError::TokenInvalid)?;

            if record.expires_at < Utc::now() {
                return Err(AuthError::TokenExpired);
            }

            record.user_id
        };

        let role = self
            .summary_for(user_id)?
            .ok_or(AuthError::UserNotFound)?
            .role;
        let aal = self.assurance_for(user_id)?;

        self.tokens.create_pair(user_id, aal, role)
    }

    async fn mint_scoped_credential(
        &self,
        admin_user_id: Uuid,
        target_user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError> {
        let admin = self
            .summary_for(admin_user_id)?
            .ok_or(AuthError::UserNotFound)?;
        if self.summary_for(target_user_id)?.is_none() {
            return Err(AuthError::UserNotFound);
        }

        self.tokens
            .create_scoped_pair(admin_user_id, target_user_id, expires_at, admin.role)
    }
}

fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| AuthError::Internal("password hash failed".into()))
}

fn verify_password(password: &str, hashed: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hashed)
        .map_err(|_| AuthError::Internal("malformed password hash".into()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform() -> InMemoryIdentityPlatform {
        InMemoryIdentityPlatform::new("test-secret-32-bytes-long-key-01").unwrap()
    }

    #[tokio::test]
    async fn test_sign_in_success() {
        let platform = platform();
        platform
            .register_user("a@example.com", "Ada", "hunter2hunter2", None, false)
            .unwrap();

        let (pair, user) = platform
            .sign_in_with_password("a@example.com", &SecretString::new("hunter2hunter2"))
            .await
            .unwrap();

        assert_eq!(user.email, "a@example.com");
        let session = platform.introspect(&pair.access_token).await.unwrap();
        assert_eq!(session.user.id, user.id);
        assert_eq!(session.aal, AssuranceLevel::Aal1);
        assert!(!session.is_impersonating());
    }

    #[tokio::test]
    async fn test_sign_in_wrong_password() {
        let platform = platform();
        platform
            .register_user("a@example.com", "Ada", "hunter2hunter2", None, false)
            .unwrap();

        let result = platform
            .sign_in_with_password("a@example.com", &SecretString::new("wrong"))
            .await;
        assert_eq!(result.unwrap_err(), AuthError::InvalidCredentials);

        let result = platform
            .sign_in_with_password("nobody@example.com", &SecretString::new("hunter2hunter2"))
            .await;
        assert_eq!(result.unwrap_err(), AuthError::InvalidCredentials);
    }

    #[tokio::test]
    async fn test_second_factor_enrollment_raises_aal() {
        let platform = platform();
        platform
            .register_user(
                "root@example.com",
                "Root",
                "hunter2hunter2",
                Some(Role::SuperAdmin),
                true,
            )
            .unwrap();

        let (pair, _) = platform
            .sign_in_with_password("root@example.com", &SecretString::new("hunter2hunter2"))
            .await
            .unwrap();

        let session = platform.introspect(&pair.access_token).await.unwrap();
        assert_eq!(session.aal, AssuranceLevel::Aal2);
        assert_eq!(session.user.role, Some(Role::SuperAdmin));
    }

    #[tokio::test]
    async fn test_artifact_single_use() {
        let platform = platform();
        let user = platform
            .register_user("a@example.com", "Ada", "hunter2hunter2", None, false)
            .unwrap();

        let artifact = platform.issue_login_artifact(user.id).await.unwrap();

        let pair = platform.redeem_login_artifact(&artifact).await.unwrap();
        let session = platform.introspect(&pair.access_token).await.unwrap();
        assert_eq!(session.user.id, user.id);

        // second redemption fails: the artifact was consumed
        assert_eq!(
            platform.redeem_login_artifact(&artifact).await,
            Err(AuthError::TokenInvalid)
        );
    }

    #[tokio::test]
    async fn test_artifact_unknown_user() {
        let platform = platform();
        assert_eq!(
            platform.issue_login_artifact(Uuid::new_v4()).await,
            Err(AuthError::UserNotFound)
        );
    }

    #[tokio::test]
    async fn test_scoped_credential_introspection() {
        let platform = platform();
        let admin = platform
            .register_user(
                "root@example.com",
                "Root",
                "hunter2hunter2",
                Some(Role::SuperAdmin),
                true,
            )
            .unwrap();
        let target = platform
            .register_user("u@example.com", "User", "hunter2hunter2", None, false)
            .unwrap();

        let expires_at = Utc::now() + Duration::minutes(30);
        let pair = platform
            .mint_scoped_credential(admin.id, target.id, expires_at)
            .await
            .unwrap();

        let session = platform.introspect(&pair.access_token).await.unwrap();
        assert_eq!(session.user.id, admin.id);
        assert_eq!(session.acting_as, Some(target.id));
        assert!(session.is_impersonating());
    }

    #[tokio::test]
    async fn test_refresh_rotates_pair() {
        let platform = platform();
        platform
            .register_user("a@example.com", "Ada", "hunter2hunter2", None, false)
            .unwrap();

        let (pair, user) = platform
            .sign_in_with_password("a@example.com", &SecretString::new("hunter2hunter2"))
            .await
            .unwrap();

        let rotated = platform.refresh(&pair.refresh_token).await.unwrap();
        let session = platform.introspect(&rotated.access_token).await.unwrap();
        assert_eq!(session.user.id, user.id);
    }
}
