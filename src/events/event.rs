use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Events emitted by warrant actions and the impersonation orchestrator.
///
/// Events are always fired. If no listeners are registered, they are
/// silently ignored (no-op). Register listeners via
/// [`register_event_listeners`](crate::register_event_listeners).
#[derive(Debug, Clone)]
pub enum AuthEvent {
    // authentication
    SignInSuccess {
        user_id: Uuid,
        email: String,
        at: DateTime<Utc>,
    },
    SignOut {
        user_id: Uuid,
        at: DateTime<Utc>,
    },

    // impersonation
    ImpersonationStarted {
        session_id: Uuid,
        admin_user_id: Uuid,
        target_user_id: Uuid,
        expires_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    ImpersonationStopped {
        session_id: Uuid,
        admin_user_id: Uuid,
        at: DateTime<Utc>,
    },
    ImpersonationExpired {
        session_id: Uuid,
        admin_user_id: Uuid,
        at: DateTime<Utc>,
    },

    // invitations
    InvitationCreated {
        team_id: i64,
        email: String,
        at: DateTime<Utc>,
    },
    InvitationAccepted {
        team_id: i64,
        user_id: Uuid,
        at: DateTime<Utc>,
    },
    InvitationRevoked {
        team_id: i64,
        invitation_id: i64,
        at: DateTime<Utc>,
    },

    // memberships
    RoleChanged {
        team_id: i64,
        user_id: Uuid,
        role: String,
        at: DateTime<Utc>,
    },
    OwnershipTransferred {
        team_id: i64,
        new_owner_id: Uuid,
        at: DateTime<Utc>,
    },

    // client state
    SessionRecovered {
        tab_id: Uuid,
        at: DateTime<Utc>,
    },
}

impl AuthEvent {
    /// Returns a dot-separated event name for logging/tracing.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SignInSuccess { .. } => "auth.signin.success",
            Self::SignOut { .. } => "auth.signout",
            Self::ImpersonationStarted { .. } => "impersonation.started",
            Self::ImpersonationStopped { .. } => "impersonation.stopped",
            Self::ImpersonationExpired { .. } => "impersonation.expired",
            Self::InvitationCreated { .. } => "invitation.created",
            Self::InvitationAccepted { .. } => "invitation.accepted",
            Self::InvitationRevoked { .. } => "invitation.revoked",
            Self::RoleChanged { .. } => "team.role_changed",
            Self::OwnershipTransferred { .. } => "team.ownership_transferred",
            Self::SessionRecovered { .. } => "session.recovered",
        }
    }

    /// Returns the timestamp when this event occurred.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::SignInSuccess { at, .. }
            | Self::SignOut { at, .. }
            | Self::ImpersonationStarted { at, .. }
            | Self::ImpersonationStopped { at, .. }
            | Self::ImpersonationExpired { at, .. }
            | Self::InvitationCreated { at, .. }
            | Self::InvitationAccepted { at, .. }
            | Self::InvitationRevoked { at, .. }
            | Self::RoleChanged { at, .. }
            | Self::OwnershipTransferred { at, .. }
            | Self::SessionRecovered { at, .. } => *at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        let now = Utc::now();

        assert_eq!(
            AuthEvent::ImpersonationStarted {
                session_id: Uuid::new_v4(),
                admin_user_id: Uuid::new_v4(),
                target_user_id: Uuid::new_v4(),
                expires_at: now,
                at: now,
            }
            .name(),
            "impersonation.started"
        );

        assert_eq!(
            AuthEvent::ImpersonationExpired {
                session_id: Uuid::new_v4(),
                admin_user_id: Uuid::new_v4(),
                at: now,
            }
            .name(),
            "impersonation.expired"
        );

        assert_eq!(
            AuthEvent::InvitationCreated {
                team_id: 1,
                email: "test@example.com".to_owned(),
                at: now,
            }
            .name(),
            "invitation.created"
        );

        assert_eq!(
            AuthEvent::OwnershipTransferred {
                team_id: 1,
                new_owner_id: Uuid::new_v4(),
                at: now,
            }
            .name(),
            "team.ownership_transferred"
        );
    }

    #[test]
    fn test_event_timestamp() {
        let now = Utc::now();
        let event = AuthEvent::SessionRecovered {
            tab_id: Uuid::new_v4(),
            at: now,
        };
        assert_eq!(event.timestamp(), now);
    }
}
