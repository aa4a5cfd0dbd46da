use chrono::Utc;
use uuid::Uuid;

use crate::events::{dispatch, AuthEvent};
use crate::roles::Role;
use crate::teams::{Team, TeamMembershipRepository, TeamRepository};
use crate::AuthError;

#[derive(Debug, Clone)]
pub struct TransferOwnershipInput {
    pub team_id: i64,
    pub current_owner_id: Uuid,
    pub new_owner_id: Uuid,
}

/// Action to transfer team ownership.
///
/// Owner only; the new owner must already be a member. The old owner
/// demotes to admin and the new one promotes to owner in that order, so
/// the at-most-one-owner invariant holds at every step.
pub struct TransferOwnershipAction<T, M>
where
    T: TeamRepository,
    M: TeamMembershipRepository,
{
    team_repo: T,
    membership_repo: M,
}

impl<T, M> TransferOwnershipAction<T, M>
where
    T: TeamRepository,
    M: TeamMembershipRepository,
{
    pub fn new(team_repo: T, membership_repo: M) -> Self {
        Self {
            team_repo,
            membership_repo,
        }
    }

    /// Transfers ownership.
    ///
    /// # Returns
    ///
    /// - `Ok(team)` - ownership moved
    /// - `Err(AuthError::NotFound)` - no such team, or new owner not a member
    /// - `Err(AuthError::Forbidden)` - caller is not the owner
    /// - `Err(AuthError::Validation(_))` - transferring to oneself
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "transfer_ownership", skip_all, err)
    )]
    pub async fn execute(&self, input: TransferOwnershipInput) -> Result<Team, AuthError> {
        let team = self
            .team_repo
            .find_by_id(input.team_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        if team.owner_id != input.current_owner_id {
            return Err(AuthError::Forbidden);
        }

        if input.current_owner_id == input.new_owner_id {
            return Err(AuthError::Validation(
                "Team is already owned by this user".to_owned(),
            ));
        }

        let new_owner_membership = self
            .membership_repo
            .find_by_team_and_user(input.team_id, input.new_owner_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        let old_owner_membership = self
            .membership_repo
            .find_by_team_and_user(input.team_id, input.current_owner_id)
            .await?
            .ok_or(AuthError::Internal("owner has no membership row".into()))?;

        // demote first so the team never has two owners
        self.membership_repo
            .update_role(old_owner_membership.id, Role::Admin)
            .await?;

        if let Err(err) = self
            .membership_repo
            .update_role(new_owner_membership.id, Role::Owner)
            .await
        {
            // put the old owner back rather than leaving the team ownerless
            if let Err(rollback_err) = self
                .membership_repo
                .update_role(old_owner_membership.id, Role::Owner)
                .await
            {
                log::error!(
                    target: "warrant",
                    "msg=\"ownership transfer rollback failed\", team_id={}, error=\"{rollback_err:?}\"",
                    input.team_id
                );
            }
            return Err(err);
        }

        let team = self
            .team_repo
            .set_owner(input.team_id, input.new_owner_id)
            .await?;

        log::info!(
            target: "warrant",
            "msg=\"ownership transferred\", team_id={}, from={}, to={}",
            team.id,
            input.current_owner_id,
            input.new_owner_id
        );

        dispatch(AuthEvent::OwnershipTransferred {
            team_id: team.id,
            new_owner_id: input.new_owner_id,
            at: Utc::now(),
        })
        .await;

        Ok(team)
    }
}
