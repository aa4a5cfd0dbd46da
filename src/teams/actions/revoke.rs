use chrono::Utc;
use uuid::Uuid;

use crate::events::{dispatch, AuthEvent};
use crate::roles::Role;
use crate::teams::{InvitationStatus, TeamInvitationRepository, TeamMembershipRepository};
use crate::AuthError;

#[derive(Debug, Clone)]
pub struct RevokeInvitationInput {
    pub invitation_id: i64,
    pub revoked_by: Uuid,
}

/// Action to revoke a pending invitation. Owner/admin only.
pub struct RevokeInvitationAction<I, M>
where
    I: TeamInvitationRepository,
    M: TeamMembershipRepository,
{
    invitation_repo: I,
    membership_repo: M,
}

impl<I, M> RevokeInvitationAction<I, M>
where
    I: TeamInvitationRepository,
    M: TeamMembershipRepository,
{
    pub fn new(invitation_repo: I, membership_repo: M) -> Self {
        Self {
            invitation_repo,
            membership_repo,
        }
    }

    /// Revokes a pending invitation.
    ///
    /// # Returns
    ///
    /// - `Ok(())` - status flipped to revoked
    /// - `Err(AuthError::NotFound)` - no such invitation
    /// - `Err(AuthError::Forbidden)` - revoker is below admin in the team
    /// - `Err(AuthError::InvitationAlreadyAccepted)` - too late to revoke
    /// - `Err(AuthError::InvitationRevoked)` - already revoked
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "revoke_invitation", skip_all, err)
    )]
    pub async fn execute(&self, input: RevokeInvitationInput) -> Result<(), AuthError> {
        let invitation = self
            .invitation_repo
            .find_by_id(input.invitation_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        let revoker = self
            .membership_repo
            .find_by_team_and_user(invitation.team_id, input.revoked_by)
            .await?
            .ok_or(AuthError::Forbidden)?;
        if !revoker.role.is_at_least(Role::Admin, false) {
            return Err(AuthError::Forbidden);
        }

        match invitation.status {
            InvitationStatus::Accepted => return Err(AuthError::InvitationAlreadyAccepted),
            InvitationStatus::Revoked => return Err(AuthError::InvitationRevoked),
            InvitationStatus::Pending => {}
        }

        self.invitation_repo
            .set_status(invitation.id, InvitationStatus::Revoked)
            .await?;

        log::info!(
            target: "warrant",
            "msg=\"invitation revoked\", team_id={}, invitation_id={}, revoked_by={}",
            invitation.team_id,
            invitation.id,
            input.revoked_by
        );

        dispatch(AuthEvent::InvitationRevoked {
            team_id: invitation.team_id,
            invitation_id: invitation.id,
            at: Utc::now(),
        })
        .await;

        Ok(())
    }
}
