use chrono::Utc;
use uuid::Uuid;

use crate::events::{dispatch, AuthEvent};
use crate::roles::{can_grant_role, Role};
use crate::teams::{TeamMembership, TeamMembershipRepository};
use crate::AuthError;

#[derive(Debug, Clone)]
pub struct PromoteMemberInput {
    pub team_id: i64,
    pub actor_id: Uuid,
    pub target_user_id: Uuid,
    pub new_role: Role,
}

/// Action to change a member's team role.
///
/// Only an owner may promote to admin. Ownership never moves here (see
/// the transfer action), and `super_admin` is not a team role. An owner
/// cannot demote themselves while they are the sole owner.
pub struct PromoteMemberAction<M: TeamMembershipRepository> {
    membership_repo: M,
}

impl<M: TeamMembershipRepository> PromoteMemberAction<M> {
    pub fn new(membership_repo: M) -> Self {
        Self { membership_repo }
    }

    /// Changes a member's role.
    ///
    /// # Returns
    ///
    /// - `Ok(membership)` - role updated
    /// - `Err(AuthError::Forbidden)` - actor lacks the required rank
    /// - `Err(AuthError::RoleNotAssignable)` - owner/super_admin requested
    /// - `Err(AuthError::SoleOwner)` - would leave the team ownerless
    /// - `Err(AuthError::NotFound)` - target is not a member
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "promote_member", skip_all, err)
    )]
    pub async fn execute(&self, input: PromoteMemberInput) -> Result<TeamMembership, AuthError> {
        let actor = self
            .membership_repo
            .find_by_team_and_user(input.team_id, input.actor_id)
            .await?
            .ok_or(AuthError::Forbidden)?;

        let target = self
            .membership_repo
            .find_by_team_and_user(input.team_id, input.target_user_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        can_grant_role(actor.role, input.new_role)?;

        // the owner's own role only moves through ownership transfer
        if target.role == Role::Owner {
            return Err(AuthError::SoleOwner);
        }

        let updated = self
            .membership_repo
            .update_role(target.id, input.new_role)
            .await?;

        log::info!(
            target: "warrant",
            "msg=\"member role changed\", team_id={}, user_id={}, role=\"{}\", by={}",
            updated.team_id,
            updated.user_id,
            updated.role.as_str(),
            input.actor_id
        );

        dispatch(AuthEvent::RoleChanged {
            team_id: updated.team_id,
            user_id: updated.user_id,
            role: updated.role.as_str().to_owned(),
            at: Utc::now(),
        })
        .await;

        Ok(updated)
    }
}
