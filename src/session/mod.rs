//! The per-tab session state machine.
//!
//! A [`SessionStore`] is the authoritative record of "who is effectively
//! authenticated as whom" for one tab. It wraps a reactive primitive
//! (`tokio::sync::watch`): every transition replaces the snapshot
//! wholesale, so observers only ever see complete states, never a
//! half-mutated one.
//!
//! The snapshot is rebuilt from the identity platform on load and auth
//! events; only the impersonation pointer survives a reload, via
//! [`ImpersonationPointerStore`].

mod health;
mod pointer;
mod store;

pub use health::{check_session, HealthIssue};
pub use pointer::{ImpersonationPointer, ImpersonationPointerStore, InMemoryPointerStore};
pub use store::SessionStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::PollConfig;
use crate::identity::{IdentityProvider, UserSummary};
use crate::roles::Role;
use crate::AuthError;

/// Where the tab currently is in the impersonation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Starting,
    Active,
    Stopping,
    /// Wall-clock time passed the recorded expiry without an explicit
    /// stop. Advisory only: the credential's own expiry, enforced
    /// upstream, is authoritative.
    ExpiredLocally,
}

impl Phase {
    /// Legal phase edges. Anything else is a client-state bug.
    pub fn can_transition(self, to: Phase) -> bool {
        matches!(
            (self, to),
            (Phase::Idle, Phase::Starting)
                | (Phase::Starting, Phase::Active)
                | (Phase::Starting, Phase::Idle)
                | (Phase::Active, Phase::Stopping)
                | (Phase::Active, Phase::ExpiredLocally)
                | (Phase::ExpiredLocally, Phase::Stopping)
                | (Phase::ExpiredLocally, Phase::Idle)
                | (Phase::Stopping, Phase::Idle)
        )
    }
}

/// The impersonation flags carried in a snapshot while one is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpersonationMarker {
    /// Audit row ID.
    pub session_id: Uuid,
    /// The admin whose credential underlies the scoped session.
    pub admin_user_id: Uuid,
    /// The user being acted as.
    pub target: UserSummary,
    /// Absolute expiry of the scoped credential. A marker without an
    /// expiry is a health-check failure, not a valid state.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Complete per-tab session state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub tab_id: Uuid,
    /// The effective user: the impersonation target while one is active.
    pub user: Option<UserSummary>,
    pub team_id: Option<i64>,
    /// Team role of the effective user in the current team.
    pub role: Option<Role>,
    pub impersonation: Option<ImpersonationMarker>,
    pub phase: Phase,
    pub updated_at: DateTime<Utc>,
}

impl SessionSnapshot {
    /// An empty, signed-out snapshot for a tab.
    pub fn empty(tab_id: Uuid) -> Self {
        Self {
            tab_id,
            user: None,
            team_id: None,
            role: None,
            impersonation: None,
            phase: Phase::Idle,
            updated_at: Utc::now(),
        }
    }

    pub fn is_impersonating(&self) -> bool {
        self.impersonation.is_some()
    }

    pub fn impersonation_expires_at(&self) -> Option<DateTime<Utc>> {
        self.impersonation.as_ref().and_then(|m| m.expires_at)
    }

    /// The role that governs route access for this tab.
    ///
    /// While impersonating, access is governed by the acting-as identity;
    /// the admin's underlying `SuperAdmin` rank never blends through.
    pub fn effective_role(&self) -> Option<Role> {
        match (&self.impersonation, self.role) {
            (Some(_), Some(Role::SuperAdmin)) => None,
            (_, role) => role,
        }
    }
}

/// Builds the initial snapshot for a tab by introspecting the current
/// credential, with a bounded poll so a slow identity platform degrades
/// the surface gracefully instead of hanging it.
///
/// A persisted impersonation pointer is honored only when introspection
/// confirms the acting-as claim; otherwise it is cleared.
pub async fn initialize_session<P, S>(
    provider: &P,
    pointer_store: &S,
    tab_id: Uuid,
    access_token: &str,
    poll: &PollConfig,
) -> Result<SessionSnapshot, AuthError>
where
    P: IdentityProvider,
    S: ImpersonationPointerStore,
{
    let mut last_err = AuthError::Upstream("identity platform unavailable".into());

    for attempt in 0..poll.attempts {
        match provider.introspect(access_token).await {
            Ok(session) => {
                let pointer = pointer_store.load().await?;

                let impersonation = match (session.acting_as, pointer) {
                    (Some(acting_as), Some(ptr)) if ptr.target_user_id == acting_as => {
                        let target = provider
                            .find_user(acting_as)
                            .await?
                            .ok_or(AuthError::UserNotFound)?;
                        Some(ImpersonationMarker {
                            session_id: ptr.session_id,
                            admin_user_id: ptr.admin_user_id,
                            target,
                            expires_at: ptr.expires_at,
                        })
                    }
                    (_, Some(_)) => {
                        // Stale pointer: the credential no longer acts as anyone.
                        pointer_store.clear().await?;
                        None
                    }
                    _ => None,
                };

                let user = match &impersonation {
                    Some(marker) => Some(marker.target.clone()),
                    None => Some(session.user),
                };

                let phase = if impersonation.is_some() {
                    Phase::Active
                } else {
                    Phase::Idle
                };

                return Ok(SessionSnapshot {
                    tab_id,
                    user,
                    team_id: None,
                    role: None,
                    impersonation,
                    phase,
                    updated_at: Utc::now(),
                });
            }
            // Bad credentials will not get better by waiting.
            Err(err @ (AuthError::TokenInvalid | AuthError::TokenExpired)) => return Err(err),
            Err(err) => {
                log::debug!(
                    target: "warrant",
                    "msg=\"session init attempt failed\", attempt={attempt}, error=\"{err:?}\""
                );
                last_err = err;
            }
        }

        tokio::time::sleep(std::time::Duration::from_millis(poll.delay_ms)).await;
    }

    log::warn!(
        target: "warrant",
        "msg=\"session init gave up after bounded poll\", attempts={}",
        poll.attempts
    );
    Err(last_err)
}
