//! The impersonation engine: audit trail, start/stop protocol, and the
//! client-side orchestrator.
//!
//! Lifecycle per tab: `Idle → Starting → Active → Stopping → Idle`, with
//! `ExpiredLocally` reached from `Active` when the wall clock passes the
//! recorded expiry without an explicit stop. Every transition is gated by
//! the permission matrix and recorded in the append-only audit trail
//! before any credential is handed to the client.

mod orchestrator;
mod repository;
mod start;
mod stop;
mod sweep;

#[cfg(feature = "mocks")]
mod mocks;

pub use orchestrator::Orchestrator;
pub use repository::{
    CreateImpersonationSession, ImpersonationLockRepository, ImpersonationSessionRepository,
};
pub use start::{StartImpersonationAction, StartImpersonationInput, StartImpersonationOutput};
pub use stop::{StopImpersonationAction, StopImpersonationOutput};
pub use sweep::SweepExpiredSessionsAction;

#[cfg(feature = "mocks")]
pub use mocks::{MockImpersonationLockRepository, MockImpersonationSessionRepository};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Absolute lifetime of a scoped impersonation credential, in minutes.
///
/// Fixed, not configurable: every impersonation ends within this bound
/// no matter what the client does.
pub const IMPERSONATION_TTL_MINUTES: i64 = 30;

/// [`IMPERSONATION_TTL_MINUTES`] as a `chrono::Duration`.
pub fn impersonation_ttl() -> Duration {
    Duration::minutes(IMPERSONATION_TTL_MINUTES)
}

/// How long a `resolving_conflict` start lock is held at most.
pub(crate) const START_LOCK_TTL_SECONDS: i64 = 10;

/// An audit row recording one impersonation.
///
/// Append-only: created on start, mutated exactly once (setting
/// `ended_at`) on stop or forced expiry, never deleted. Retention is the
/// operator's contract (one year).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpersonationSession {
    pub id: Uuid,
    pub admin_user_id: Uuid,
    pub target_user_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Set exactly once; `None` means the session is active.
    pub ended_at: Option<DateTime<Utc>>,
    pub reason: String,
}

impl ImpersonationSession {
    /// Active means no `ended_at` yet.
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Absolute expiry of the scoped credential minted for this session.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.started_at + impersonation_ttl()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_is_thirty_minutes_from_start() {
        let row = ImpersonationSession {
            id: Uuid::new_v4(),
            admin_user_id: Uuid::new_v4(),
            target_user_id: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
            reason: "support".to_owned(),
        };

        assert_eq!(row.expires_at() - row.started_at, Duration::minutes(30));
        assert!(row.is_active());
    }
}
