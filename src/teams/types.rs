//! Core types for team management.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::roles::Role;

/// A team is an organizational unit that groups users together.
///
/// Invariant: `owner_id` always names exactly one owner; ownership moves
/// only through the transfer action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    /// Unique identifier.
    pub id: i64,
    /// Human-readable team name.
    pub name: String,
    /// URL-friendly unique identifier.
    pub slug: String,
    /// User ID of the team owner.
    pub owner_id: Uuid,
    /// When the team was created.
    pub created_at: DateTime<Utc>,
    /// When the team was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Links a user to a team with a role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMembership {
    /// Unique identifier.
    pub id: i64,
    /// The team this membership belongs to.
    pub team_id: i64,
    /// The user who is a member.
    pub user_id: Uuid,
    /// The member's team role. Never `SuperAdmin`.
    pub role: Role,
    /// When the user joined the team.
    pub joined_at: DateTime<Utc>,
    /// When the membership was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle state of an invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Revoked,
}

/// An invitation for a user to join a team.
///
/// Only the SHA-256 hash of the token is persisted; the plaintext exists
/// solely in the delivered link. Expiry is evaluated lazily at read time,
/// there is no background sweep for invitations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamInvitation {
    /// Unique identifier.
    pub id: i64,
    /// The team being invited to.
    pub team_id: i64,
    /// Email of the invitee.
    pub email: String,
    /// Role to assign when accepted.
    pub role: Role,
    /// SHA-256 hash of the invitation token.
    #[serde(skip_serializing)]
    pub token_hash: String,
    /// User ID of who sent the invitation.
    pub invited_by: Uuid,
    pub status: InvitationStatus,
    /// When the invitation expires.
    pub expires_at: DateTime<Utc>,
    /// When the invitation was created.
    pub created_at: DateTime<Utc>,
}

impl TeamInvitation {
    /// Check if the invitation has expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    /// Pending and not yet expired.
    pub fn is_acceptable(&self) -> bool {
        self.status == InvitationStatus::Pending && !self.is_expired()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn invitation(status: InvitationStatus, expires_at: DateTime<Utc>) -> TeamInvitation {
        TeamInvitation {
            id: 1,
            team_id: 1,
            email: "test@example.com".to_owned(),
            role: Role::Member,
            token_hash: "hash".to_owned(),
            invited_by: Uuid::new_v4(),
            status,
            expires_at,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_invitation_is_expired() {
        let expired = invitation(
            InvitationStatus::Pending,
            Utc::now() - Duration::hours(1),
        );
        assert!(expired.is_expired());
        assert!(!expired.is_acceptable());

        let valid = invitation(InvitationStatus::Pending, Utc::now() + Duration::hours(1));
        assert!(!valid.is_expired());
        assert!(valid.is_acceptable());
    }

    #[test]
    fn test_non_pending_is_not_acceptable() {
        let accepted = invitation(
            InvitationStatus::Accepted,
            Utc::now() + Duration::hours(1),
        );
        assert!(!accepted.is_acceptable());

        let revoked = invitation(InvitationStatus::Revoked, Utc::now() + Duration::hours(1));
        assert!(!revoked.is_acceptable());
    }

    #[test]
    fn test_token_hash_not_serialized() {
        let inv = invitation(InvitationStatus::Pending, Utc::now());
        let json = serde_json::to_string(&inv).unwrap();
        assert!(!json.contains("token_hash"));
        assert!(!json.contains("hash"));
    }
}
