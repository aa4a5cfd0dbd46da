use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::repository::{
    CreateImpersonationSession, ImpersonationLockRepository, ImpersonationSessionRepository,
};
use super::{impersonation_ttl, START_LOCK_TTL_SECONDS};
use crate::custody::TokenCustodyRecord;
use crate::events::{dispatch, AuthEvent};
use crate::identity::{IdentityProvider, UserSummary};
use crate::roles::Role;
use crate::token::TokenPair;
use crate::validators::validate_reason;
use crate::AuthError;

/// Input for starting an impersonation.
#[derive(Debug, Clone)]
pub struct StartImpersonationInput {
    /// The caller's current bearer credential.
    pub access_token: String,
    pub target_user_id: Uuid,
    pub reason: String,
}

/// Output mirroring the `start-impersonation` endpoint contract.
#[derive(Debug)]
pub struct StartImpersonationOutput {
    /// Freshly minted scoped credential pair.
    pub session: TokenPair,
    pub target_user: UserSummary,
    /// Audit row ID.
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
    /// Custody of the admin's identity for the eventual restoration.
    pub custody: TokenCustodyRecord,
}

/// Action to start impersonating a user.
///
/// Ordering is load-bearing: the audit row is persisted *before* the
/// scoped credential is minted and returned, so a client crash mid-flow
/// still leaves a valid audit entry. Authorization failures happen before
/// either and create no row at all.
pub struct StartImpersonationAction<P, R, L>
where
    P: IdentityProvider,
    R: ImpersonationSessionRepository,
    L: ImpersonationLockRepository,
{
    provider: P,
    sessions: R,
    locks: L,
}

impl<P, R, L> StartImpersonationAction<P, R, L>
where
    P: IdentityProvider,
    R: ImpersonationSessionRepository,
    L: ImpersonationLockRepository,
{
    pub fn new(provider: P, sessions: R, locks: L) -> Self {
        Self {
            provider,
            sessions,
            locks,
        }
    }

    /// Starts an impersonation.
    ///
    /// # Returns
    ///
    /// - `Ok(output)` - scoped credential and audit handle
    /// - `Err(AuthError::Forbidden)` - caller is not exactly `super_admin`,
    ///   or is already acting as someone
    /// - `Err(AuthError::SecondaryVerificationRequired)` - session is not Aal2
    /// - `Err(AuthError::SelfImpersonation)` - target is the caller
    /// - `Err(AuthError::UserNotFound)` - no such target
    /// - `Err(AuthError::StartInProgress)` - another tab is mid-start
    /// - `Err(AuthError::Upstream(_))` - platform failure
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "start_impersonation", skip_all, err)
    )]
    pub async fn execute(
        &self,
        input: StartImpersonationInput,
    ) -> Result<StartImpersonationOutput, AuthError> {
        validate_reason(&input.reason)?;

        let caller = self.provider.introspect(&input.access_token).await?;

        // exact super_admin rank, never an inherited one
        let is_super_admin = caller
            .user
            .role
            .is_some_and(|r| r.is_at_least(Role::SuperAdmin, true));
        if !is_super_admin {
            log::warn!(
                target: "warrant",
                "msg=\"impersonation denied\", caller={}, reason=\"not super_admin\"",
                caller.user.id
            );
            return Err(AuthError::Forbidden);
        }

        // a scoped credential cannot start another impersonation:
        // the acting-as claim governs, not the underlying rank
        if caller.acting_as.is_some() {
            return Err(AuthError::Forbidden);
        }

        if !caller.aal.has_secondary_verification() {
            return Err(AuthError::SecondaryVerificationRequired);
        }

        if caller.user.id == input.target_user_id {
            return Err(AuthError::SelfImpersonation);
        }

        let target_user = self
            .provider
            .find_user(input.target_user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        // resolving_conflict lock: one start attempt per admin at a time
        let lock_ttl = Duration::seconds(START_LOCK_TTL_SECONDS);
        if !self.locks.acquire(caller.user.id, lock_ttl).await? {
            return Err(AuthError::StartInProgress);
        }

        let result = self.start_locked(&caller.user, target_user, &input.reason).await;

        if let Err(release_err) = self.locks.release(caller.user.id).await {
            log::error!(
                target: "warrant",
                "msg=\"failed to release start lock\", admin={}, error=\"{release_err:?}\"",
                caller.user.id
            );
        }

        result
    }

    async fn start_locked(
        &self,
        admin: &UserSummary,
        target_user: UserSummary,
        reason: &str,
    ) -> Result<StartImpersonationOutput, AuthError> {
        // replace, never stack: a row left open past its expiry (crash,
        // abandoned tab) is closed and replaced; a live one is a conflict
        let now = Utc::now();
        for open in self.sessions.find_active_by_admin(admin.id).await? {
            if open.expires_at() > now {
                return Err(AuthError::ActiveSessionExists);
            }
            log::warn!(
                target: "warrant",
                "msg=\"closing stale impersonation before new start\", session_id={}, admin={}",
                open.id,
                admin.id
            );
            self.sessions.close(open.id, open.expires_at()).await?;
        }

        // audit row first
        let row = self
            .sessions
            .create(CreateImpersonationSession {
                admin_user_id: admin.id,
                target_user_id: target_user.id,
                reason: reason.to_owned(),
            })
            .await?;

        let expires_at = row.started_at + impersonation_ttl();

        // then the credential; on failure the row is closed best-effort
        // so it does not linger until the sweep
        let session = match self
            .provider
            .mint_scoped_credential(admin.id, target_user.id, expires_at)
            .await
        {
            Ok(pair) => pair,
            Err(err) => {
                if let Err(close_err) = self.sessions.close(row.id, Utc::now()).await {
                    log::error!(
                        target: "warrant",
                        "msg=\"failed to close audit row after mint failure\", session_id={}, error=\"{close_err:?}\"",
                        row.id
                    );
                }
                return Err(err);
            }
        };

        log::info!(
            target: "warrant",
            "msg=\"impersonation started\", session_id={}, admin={}, target={}, expires_at={expires_at}",
            row.id,
            admin.id,
            target_user.id
        );

        dispatch(AuthEvent::ImpersonationStarted {
            session_id: row.id,
            admin_user_id: admin.id,
            target_user_id: target_user.id,
            expires_at,
            at: Utc::now(),
        })
        .await;

        Ok(StartImpersonationOutput {
            session,
            target_user,
            session_id: row.id,
            expires_at,
            custody: TokenCustodyRecord::capture(admin.id),
        })
    }
}
