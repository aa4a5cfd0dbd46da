use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::types::{InvitationStatus, Team, TeamInvitation, TeamMembership};
use crate::roles::Role;
use crate::AuthError;

#[derive(Debug, Clone)]
pub struct CreateTeam {
    pub name: String,
    pub slug: String,
    pub owner_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct CreateMembership {
    pub team_id: i64,
    pub user_id: Uuid,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct CreateInvitation {
    pub team_id: i64,
    pub email: String,
    pub role: Role,
    pub token_hash: String,
    pub invited_by: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait TeamRepository: Send + Sync {
    async fn create(&self, data: CreateTeam) -> Result<Team, AuthError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Team>, AuthError>;
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Team>, AuthError>;
    async fn set_owner(&self, team_id: i64, new_owner_id: Uuid) -> Result<Team, AuthError>;
}

#[async_trait]
pub trait TeamMembershipRepository: Send + Sync {
    /// Creates a membership. Enforces at-most-one-owner-per-team.
    async fn create(&self, data: CreateMembership) -> Result<TeamMembership, AuthError>;
    async fn find_by_team_and_user(
        &self,
        team_id: i64,
        user_id: Uuid,
    ) -> Result<Option<TeamMembership>, AuthError>;
    async fn find_by_team(&self, team_id: i64) -> Result<Vec<TeamMembership>, AuthError>;
    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<TeamMembership>, AuthError>;
    /// Changes a member's role. Enforces at-most-one-owner-per-team.
    async fn update_role(&self, id: i64, role: Role) -> Result<TeamMembership, AuthError>;
    async fn delete_by_team_and_user(&self, team_id: i64, user_id: Uuid)
        -> Result<(), AuthError>;
    /// Number of owners in a team (0 or 1 when the invariant holds).
    async fn count_owners(&self, team_id: i64) -> Result<u64, AuthError>;
}

#[async_trait]
pub trait TeamInvitationRepository: Send + Sync {
    async fn create(&self, data: CreateInvitation) -> Result<TeamInvitation, AuthError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<TeamInvitation>, AuthError>;
    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<TeamInvitation>, AuthError>;
    async fn find_pending_by_team_and_email(
        &self,
        team_id: i64,
        email: &str,
    ) -> Result<Option<TeamInvitation>, AuthError>;
    async fn find_pending_by_team(&self, team_id: i64) -> Result<Vec<TeamInvitation>, AuthError>;
    /// Flips an invitation's status.
    async fn set_status(
        &self,
        id: i64,
        status: InvitationStatus,
    ) -> Result<TeamInvitation, AuthError>;
}

#[async_trait]
impl<T: TeamRepository + ?Sized> TeamRepository for Arc<T> {
    async fn create(&self, data: CreateTeam) -> Result<Team, AuthError> {
        (**self).create(data).await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Team>, AuthError> {
        (**self).find_by_id(id).await
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Team>, AuthError> {
        (**self).find_by_slug(slug).await
    }

    async fn set_owner(&self, team_id: i64, new_owner_id: Uuid) -> Result<Team, AuthError> {
        (**self).set_owner(team_id, new_owner_id).await
    }
}

#[async_trait]
impl<M: TeamMembershipRepository + ?Sized> TeamMembershipRepository for Arc<M> {
    async fn create(&self, data: CreateMembership) -> Result<TeamMembership, AuthError> {
        (**self).create(data).await
    }

    async fn find_by_team_and_user(
        &self,
        team_id: i64,
        user_id: Uuid,
    ) -> Result<Option<TeamMembership>, AuthError> {
        (**self).find_by_team_and_user(team_id, user_id).await
    }

    async fn find_by_team(&self, team_id: i64) -> Result<Vec<TeamMembership>, AuthError> {
        (**self).find_by_team(team_id).await
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<TeamMembership>, AuthError> {
        (**self).find_by_user(user_id).await
    }

    async fn update_role(&self, id: i64, role: Role) -> Result<TeamMembership, AuthError> {
        (**self).update_role(id, role).await
    }

    async fn delete_by_team_and_user(
        &self,
        team_id: i64,
        user_id: Uuid,
    ) -> Result<(), AuthError> {
        (**self).delete_by_team_and_user(team_id, user_id).await
    }

    async fn count_owners(&self, team_id: i64) -> Result<u64, AuthError> {
        (**self).count_owners(team_id).await
    }
}

#[async_trait]
impl<I: TeamInvitationRepository + ?Sized> TeamInvitationRepository for Arc<I> {
    async fn create(&self, data: CreateInvitation) -> Result<TeamInvitation, AuthError> {
        (**self).create(data).await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<TeamInvitation>, AuthError> {
        (**self).find_by_id(id).await
    }

    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<TeamInvitation>, AuthError> {
        (**self).find_by_token_hash(token_hash).await
    }

    async fn find_pending_by_team_and_email(
        &self,
        team_id: i64,
        email: &str,
    ) -> Result<Option<TeamInvitation>, AuthError> {
        (**self)
            .find_pending_by_team_and_email(team_id, email)
            .await
    }

    async fn find_pending_by_team(&self, team_id: i64) -> Result<Vec<TeamInvitation>, AuthError> {
        (**self).find_pending_by_team(team_id).await
    }

    async fn set_status(
        &self,
        id: i64,
        status: InvitationStatus,
    ) -> Result<TeamInvitation, AuthError> {
        (**self).set_status(id, status).await
    }
}

/// Lazily evaluated pending filter shared by the mock queries.
pub(crate) fn is_live_pending(invitation: &TeamInvitation, now: DateTime<Utc>) -> bool {
    invitation.status == InvitationStatus::Pending && invitation.expires_at > now
}
