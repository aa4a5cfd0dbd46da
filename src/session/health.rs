//! Pure session health check.
//!
//! Inspects a snapshot and returns the list of detected inconsistencies.
//! Any tab observing an issue may broadcast a recovery envelope with a
//! known-good snapshot; see the impersonation orchestrator.

use std::fmt;

use chrono::{DateTime, Utc};

use super::SessionSnapshot;

/// A client-state inconsistency detected by [`check_session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthIssue {
    /// A role is set but no team is selected.
    RoleWithoutTeam,
    /// The impersonation flag is set without an expiry.
    ImpersonationWithoutExpiry,
    /// The recorded expiry is in the past while still flagged active.
    ImpersonationExpired,
}

impl fmt::Display for HealthIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoleWithoutTeam => write!(f, "Role is set but no team is selected"),
            Self::ImpersonationWithoutExpiry => {
                write!(f, "Impersonation is active without an expiry")
            }
            Self::ImpersonationExpired => write!(f, "Impersonation session expired"),
        }
    }
}

/// Checks a snapshot for inconsistencies. Pure; `now` is passed in so
/// callers (and tests) control the clock.
pub fn check_session(snapshot: &SessionSnapshot, now: DateTime<Utc>) -> Vec<HealthIssue> {
    let mut issues = Vec::new();

    if snapshot.role.is_some() && snapshot.team_id.is_none() {
        issues.push(HealthIssue::RoleWithoutTeam);
    }

    if let Some(marker) = &snapshot.impersonation {
        match marker.expires_at {
            None => issues.push(HealthIssue::ImpersonationWithoutExpiry),
            Some(expires_at) if expires_at < now => {
                issues.push(HealthIssue::ImpersonationExpired);
            }
            Some(_) => {}
        }
    }

    issues
}
