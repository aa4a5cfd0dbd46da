use uuid::Uuid;

use crate::roles::Role;
use crate::teams::TeamMembershipRepository;
use crate::AuthError;

#[derive(Debug, Clone)]
pub struct RemoveMemberInput {
    pub team_id: i64,
    pub actor_id: Uuid,
    pub target_user_id: Uuid,
}

/// Action to remove a member from a team.
///
/// Admin-or-better may remove members. Owners are never removed this
/// way; ownership has to be transferred first.
pub struct RemoveMemberAction<M: TeamMembershipRepository> {
    membership_repo: M,
}

impl<M: TeamMembershipRepository> RemoveMemberAction<M> {
    pub fn new(membership_repo: M) -> Self {
        Self { membership_repo }
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "remove_member", skip_all, err)
    )]
    pub async fn execute(&self, input: RemoveMemberInput) -> Result<(), AuthError> {
        let actor = self
            .membership_repo
            .find_by_team_and_user(input.team_id, input.actor_id)
            .await?
            .ok_or(AuthError::Forbidden)?;

        // members may leave on their own; removing someone else needs admin
        let self_removal = input.actor_id == input.target_user_id;
        if !self_removal && !actor.role.is_at_least(Role::Admin, false) {
            return Err(AuthError::Forbidden);
        }

        let target = self
            .membership_repo
            .find_by_team_and_user(input.team_id, input.target_user_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        if target.role == Role::Owner {
            return Err(AuthError::SoleOwner);
        }

        self.membership_repo
            .delete_by_team_and_user(input.team_id, input.target_user_id)
            .await?;

        log::info!(
            target: "warrant",
            "msg=\"member removed\", team_id={}, user_id={}, by={}",
            input.team_id,
            input.target_user_id,
            input.actor_id
        );

        Ok(())
    }
}
