use chrono::Utc;
use uuid::Uuid;

use super::repository::ImpersonationSessionRepository;
use crate::custody::{RestorationProtocol, TokenCustodyRecord};
use crate::events::{dispatch, AuthEvent};
use crate::identity::IdentityProvider;
use crate::token::TokenPair;
use crate::AuthError;

/// Output mirroring the `stop-impersonation` endpoint contract.
#[derive(Debug)]
pub struct StopImpersonationOutput {
    /// Fresh session pair for the admin's own identity.
    pub session: TokenPair,
}

/// Action to stop an impersonation.
///
/// The audit row is closed *before* the restoration protocol runs: audit
/// closure must never depend on the client receiving a usable response.
/// A second stop for the same session is `NotFound`, never a second
/// mutation.
pub struct StopImpersonationAction<P, R>
where
    P: IdentityProvider,
    R: ImpersonationSessionRepository,
{
    provider: P,
    sessions: R,
}

impl<P, R> StopImpersonationAction<P, R>
where
    P: IdentityProvider + Clone,
    R: ImpersonationSessionRepository,
{
    pub fn new(provider: P, sessions: R) -> Self {
        Self { provider, sessions }
    }

    /// Stops an impersonation session.
    ///
    /// # Returns
    ///
    /// - `Ok(output)` - row closed, fresh admin session pair minted
    /// - `Err(AuthError::NotFound)` - no open session with that id
    ///   (including repeated stops)
    /// - `Err(AuthError::Forbidden)` - caller is not the session's admin
    /// - `Err(AuthError::Upstream(_))` - restoration failed; the audit
    ///   row is closed regardless
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "stop_impersonation", skip_all, err)
    )]
    pub async fn execute(
        &self,
        access_token: &str,
        session_id: Uuid,
    ) -> Result<StopImpersonationOutput, AuthError> {
        let row = self
            .sessions
            .find_by_id(session_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        // idempotency: an already-closed row is "nothing left to stop"
        if !row.is_active() {
            return Err(AuthError::NotFound);
        }

        let caller = self.provider.introspect(access_token).await?;
        if caller.user.id != row.admin_user_id {
            log::warn!(
                target: "warrant",
                "msg=\"stop denied\", session_id={session_id}, caller={}, admin={}",
                caller.user.id,
                row.admin_user_id
            );
            return Err(AuthError::Forbidden);
        }

        // close first; restoration comes after and may still fail
        let closed = self.sessions.close(row.id, Utc::now()).await?;

        log::info!(
            target: "warrant",
            "msg=\"impersonation stopped\", session_id={}, admin={}, target={}",
            closed.id,
            closed.admin_user_id,
            closed.target_user_id
        );

        dispatch(AuthEvent::ImpersonationStopped {
            session_id: closed.id,
            admin_user_id: closed.admin_user_id,
            at: Utc::now(),
        })
        .await;

        let custody = TokenCustodyRecord::capture(closed.admin_user_id);
        let session = RestorationProtocol::new(self.provider.clone())
            .restore(&custody)
            .await?;

        Ok(StopImpersonationOutput { session })
    }
}

#[cfg(all(test, feature = "mocks"))]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::identity::InMemoryIdentityPlatform;
    use crate::impersonation::{
        CreateImpersonationSession, MockImpersonationSessionRepository,
    };
    use crate::roles::Role;
    use crate::SecretString;

    struct Fixture {
        platform: Arc<InMemoryIdentityPlatform>,
        sessions: Arc<MockImpersonationSessionRepository>,
        admin_token: String,
        admin_id: Uuid,
        target_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let platform =
            Arc::new(InMemoryIdentityPlatform::new("test-secret-32-bytes-long-key-01").unwrap());
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

        let (pair, _) = platform
            .sign_in_with_password("root@example.com", &SecretString::new("hunter2hunter2"))
            .await
            .unwrap();

        Fixture {
            platform,
            sessions: Arc::new(MockImpersonationSessionRepository::new()),
            admin_token: pair.access_token,
            admin_id: admin.id,
            target_id: target.id,
        }
    }

    fn action(
        f: &Fixture,
    ) -> StopImpersonationAction<
        Arc<InMemoryIdentityPlatform>,
        Arc<MockImpersonationSessionRepository>,
    > {
        StopImpersonationAction::new(f.platform.clone(), f.sessions.clone())
    }

    async fn open_row(f: &Fixture) -> Uuid {
        f.sessions
            .create(CreateImpersonationSession {
                admin_user_id: f.admin_id,
                target_user_id: f.target_id,
                reason: "support".to_owned(),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_stop_closes_row_and_regenerates_session() {
        let f = fixture().await;
        let session_id = open_row(&f).await;

        let output = action(&f)
            .execute(&f.admin_token, session_id)
            .await
            .unwrap();

        // row closed with ordered timestamps
        let row = f.sessions.find_by_id(session_id).await.unwrap().unwrap();
        assert!(row.ended_at.is_some());
        assert!(row.ended_at.unwrap() >= row.started_at);

        // the fresh pair is the admin's own identity, not a scoped one
        let session = f
            .platform
            .introspect(&output.session.access_token)
            .await
            .unwrap();
        assert_eq!(session.user.id, f.admin_id);
        assert!(!session.is_impersonating());
    }

    #[tokio::test]
    async fn test_stop_twice_is_not_found() {
        let f = fixture().await;
        let session_id = open_row(&f).await;
        let act = action(&f);

        act.execute(&f.admin_token, session_id).await.unwrap();

        let err = act.execute(&f.admin_token, session_id).await.unwrap_err();
        assert_eq!(err, AuthError::NotFound);

        // still exactly one mutation
        let row = f.sessions.find_by_id(session_id).await.unwrap().unwrap();
        assert!(row.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_stop_unknown_session() {
        let f = fixture().await;
        let err = action(&f)
            .execute(&f.admin_token, Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::NotFound);
    }

    #[tokio::test]
    async fn test_stop_by_other_user_is_forbidden() {
        let f = fixture().await;
        let session_id = open_row(&f).await;

        let (pair, _) = f
            .platform
            .sign_in_with_password("u@example.com", &SecretString::new("hunter2hunter2"))
            .await
            .unwrap();

        let err = action(&f)
            .execute(&pair.access_token, session_id)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::Forbidden);

        // no mutation happened
        let row = f.sessions.find_by_id(session_id).await.unwrap().unwrap();
        assert!(row.is_active());
    }

    /// Wrapper that fails artifact issuance, for the fail-closed path.
    #[derive(Clone)]
    struct BrokenArtifactPlatform {
        inner: Arc<InMemoryIdentityPlatform>,
    }

    #[async_trait::async_trait]
    impl crate::identity::IdentityProvider for BrokenArtifactPlatform {
        async fn sign_in_with_password(
            &self,
            email: &str,
            password: &SecretString,
        ) -> Result<(TokenPair, crate::identity::UserSummary), AuthError> {
            self.inner.sign_in_with_password(email, password).await
        }

        async fn introspect(
            &self,
            access_token: &str,
        ) -> Result<crate::identity::IntrospectedSession, AuthError> {
            self.inner.introspect(access_token).await
        }

        async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
            self.inner.refresh(refresh_token).await
        }

        async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
            self.inner.sign_out(access_token).await
        }

        async fn find_user(
            &self,
            user_id: Uuid,
        ) -> Result<Option<crate::identity::UserSummary>, AuthError> {
            self.inner.find_user(user_id).await
        }

        async fn find_user_by_email(
            &self,
            email: &str,
        ) -> Result<Option<crate::identity::UserSummary>, AuthError> {
            self.inner.find_user_by_email(email).await
        }

        async fn issue_login_artifact(
            &self,
            _user_id: Uuid,
        ) -> Result<SecretString, AuthError> {
            Err(AuthError::Upstream("artifact endpoint down".into()))
        }

        async fn redeem_login_artifact(
            &self,
            artifact: &SecretString,
        ) -> Result<TokenPair, AuthError> {
            self.inner.redeem_login_artifact(artifact).await
        }

        async fn mint_scoped_credential(
            &self,
            admin_user_id: Uuid,
            target_user_id: Uuid,
            expires_at: chrono::DateTime<Utc>,
        ) -> Result<TokenPair, AuthError> {
            self.inner
                .mint_scoped_credential(admin_user_id, target_user_id, expires_at)
                .await
        }
    }

    #[tokio::test]
    async fn test_restoration_failure_still_closes_row() {
        let f = fixture().await;
        let session_id = open_row(&f).await;

        let broken = BrokenArtifactPlatform {
            inner: f.platform.clone(),
        };
        let act = StopImpersonationAction::new(broken, f.sessions.clone());

        let err = act.execute(&f.admin_token, session_id).await.unwrap_err();
        assert!(matches!(err, AuthError::Upstream(_)));

        // the stop failed closed, but the audit row is ended anyway
        let row = f.sessions.find_by_id(session_id).await.unwrap().unwrap();
        assert!(row.ended_at.is_some());
    }
}
