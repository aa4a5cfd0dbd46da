use chrono::Utc;
use uuid::Uuid;

use crate::crypto::{hash_token, SecretString};
use crate::events::{dispatch, AuthEvent};
use crate::identity::IdentityProvider;
use crate::teams::{
    CreateMembership, InvitationStatus, TeamInvitationRepository, TeamMembership,
    TeamMembershipRepository,
};
use crate::AuthError;

/// Output mirroring the `accept-invite` endpoint contract.
#[derive(Debug)]
pub struct AcceptInvitationOutput {
    /// The created membership; `None` when the user was already a member.
    pub membership: Option<TeamMembership>,
    pub is_existing_member: bool,
}

/// Action to accept a team invitation.
///
/// The caller presents the plain token from the delivered link; the hash
/// is what gets looked up. Status and expiry are checked lazily here, at
/// read time. Membership creation and the status flip happen together,
/// and an already-member recheck guards the window so a membership row
/// is never duplicated.
pub struct AcceptInvitationAction<P, I, M>
where
    P: IdentityProvider,
    I: TeamInvitationRepository,
    M: TeamMembershipRepository,
{
    provider: P,
    invitation_repo: I,
    membership_repo: M,
}

impl<P, I, M> AcceptInvitationAction<P, I, M>
where
    P: IdentityProvider,
    I: TeamInvitationRepository,
    M: TeamMembershipRepository,
{
    pub fn new(provider: P, invitation_repo: I, membership_repo: M) -> Self {
        Self {
            provider,
            invitation_repo,
            membership_repo,
        }
    }

    /// Accepts an invitation using the provided token.
    ///
    /// # Returns
    ///
    /// - `Ok(output)` - membership created, or confirmed pre-existing
    /// - `Err(AuthError::TokenInvalid)` - no invitation for this token
    /// - `Err(AuthError::TokenExpired)` - invitation expired (lazy check)
    /// - `Err(AuthError::EmailMismatch)` - caller's email differs
    /// - `Err(AuthError::InvitationAlreadyAccepted)` - already used
    /// - `Err(AuthError::InvitationRevoked)` - withdrawn by the team
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "accept_invitation", skip_all, err)
    )]
    pub async fn execute(
        &self,
        token: &SecretString,
        user_id: Uuid,
    ) -> Result<AcceptInvitationOutput, AuthError> {
        let token_hash = hash_token(token.expose_secret());

        let invitation = self
            .invitation_repo
            .find_by_token_hash(&token_hash)
            .await?
            .ok_or(AuthError::TokenInvalid)?;

        let user = self
            .provider
            .find_user(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if invitation.email != user.email {
            return Err(AuthError::EmailMismatch);
        }

        match invitation.status {
            InvitationStatus::Accepted => return Err(AuthError::InvitationAlreadyAccepted),
            InvitationStatus::Revoked => return Err(AuthError::InvitationRevoked),
            InvitationStatus::Pending => {}
        }

        if invitation.is_expired() {
            return Err(AuthError::TokenExpired);
        }

        // already a member: flip the status, report, create nothing
        if self
            .membership_repo
            .find_by_team_and_user(invitation.team_id, user_id)
            .await?
            .is_some()
        {
            self.mark_accepted(invitation.id).await;
            return Ok(AcceptInvitationOutput {
                membership: None,
                is_existing_member: true,
            });
        }

        let membership = self
            .membership_repo
            .create(CreateMembership {
                team_id: invitation.team_id,
                user_id,
                role: invitation.role,
            })
            .await?;

        self.mark_accepted(invitation.id).await;

        log::info!(
            target: "warrant",
            "msg=\"invitation accepted\", team_id={}, user_id={}, membership_id={}",
            membership.team_id,
            membership.user_id,
            membership.id
        );

        dispatch(AuthEvent::InvitationAccepted {
            team_id: membership.team_id,
            user_id,
            at: Utc::now(),
        })
        .await;

        Ok(AcceptInvitationOutput {
            membership: Some(membership),
            is_existing_member: false,
        })
    }

    /// Flip the status; the membership already exists, so a failure here
    /// is logged rather than surfaced.
    async fn mark_accepted(&self, invitation_id: i64) {
        if let Err(e) = self
            .invitation_repo
            .set_status(invitation_id, InvitationStatus::Accepted)
            .await
        {
            log::error!(
                target: "warrant",
                "msg=\"failed to mark invitation as accepted\", invitation_id={invitation_id}, error=\"{e}\""
            );
        }
    }
}

#[cfg(all(test, feature = "mocks"))]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::identity::InMemoryIdentityPlatform;
    use crate::roles::Role;
    use crate::teams::{
        CreateInvitation, MockTeamInvitationRepository, MockTeamMembershipRepository,
    };

    struct Fixture {
        platform: Arc<InMemoryIdentityPlatform>,
        invitations: Arc<MockTeamInvitationRepository>,
        memberships: Arc<MockTeamMembershipRepository>,
        invitee_id: Uuid,
    }

    const TOKEN: &str = "test-token-12345";

    async fn fixture() -> Fixture {
        let platform =
            Arc::new(InMemoryIdentityPlatform::new("test-secret-32-bytes-long-key-01").unwrap());
        let invitee = platform
            .register_user(
                "invitee@example.com",
                "Invitee",
                "hunter2hunter2",
                None,
                false,
            )
            .unwrap();

        Fixture {
            platform,
            invitations: Arc::new(MockTeamInvitationRepository::new()),
            memberships: Arc::new(MockTeamMembershipRepository::new()),
            invitee_id: invitee.id,
        }
    }

    async fn seed_invitation(f: &Fixture, expires_at: chrono::DateTime<Utc>) -> i64 {
        f.invitations
            .create(CreateInvitation {
                team_id: 1,
                email: "invitee@example.com".to_owned(),
                role: Role::Member,
                token_hash: hash_token(TOKEN),
                invited_by: Uuid::new_v4(),
                expires_at,
            })
            .await
            .unwrap()
            .id
    }

    fn action(
        f: &Fixture,
    ) -> AcceptInvitationAction<
        Arc<InMemoryIdentityPlatform>,
        Arc<MockTeamInvitationRepository>,
        Arc<MockTeamMembershipRepository>,
    > {
        AcceptInvitationAction::new(
            f.platform.clone(),
            f.invitations.clone(),
            f.memberships.clone(),
        )
    }

    #[tokio::test]
    async fn test_accept_success() {
        let f = fixture().await;
        let invitation_id = seed_invitation(&f, Utc::now() + Duration::days(7)).await;

        let output = action(&f)
            .execute(&SecretString::new(TOKEN), f.invitee_id)
            .await
            .unwrap();

        assert!(!output.is_existing_member);
        let membership = output.membership.unwrap();
        assert_eq!(membership.team_id, 1);
        assert_eq!(membership.user_id, f.invitee_id);
        assert_eq!(membership.role, Role::Member);

        let invitation = f
            .invitations
            .find_by_id(invitation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(invitation.status, InvitationStatus::Accepted);
    }

    #[tokio::test]
    async fn test_accept_invalid_token() {
        let f = fixture().await;
        seed_invitation(&f, Utc::now() + Duration::days(7)).await;

        let err = action(&f)
            .execute(&SecretString::new("wrong-token"), f.invitee_id)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::TokenInvalid);
    }

    #[tokio::test]
    async fn test_accept_expired() {
        let f = fixture().await;
        seed_invitation(&f, Utc::now() - Duration::hours(1)).await;

        let err = action(&f)
            .execute(&SecretString::new(TOKEN), f.invitee_id)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::TokenExpired);
        assert!(f
            .memberships
            .find_by_team_and_user(1, f.invitee_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_accept_email_mismatch() {
        let f = fixture().await;
        seed_invitation(&f, Utc::now() + Duration::days(7)).await;

        let other = f
            .platform
            .register_user("other@example.com", "Other", "hunter2hunter2", None, false)
            .unwrap();

        let err = action(&f)
            .execute(&SecretString::new(TOKEN), other.id)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::EmailMismatch);
    }

    #[tokio::test]
    async fn test_accept_twice_conflicts_without_duplicate_membership() {
        let f = fixture().await;
        seed_invitation(&f, Utc::now() + Duration::days(7)).await;
        let act = action(&f);

        act.execute(&SecretString::new(TOKEN), f.invitee_id)
            .await
            .unwrap();

        let err = act
            .execute(&SecretString::new(TOKEN), f.invitee_id)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvitationAlreadyAccepted);

        let memberships = f.memberships.find_by_team(1).await.unwrap();
        assert_eq!(memberships.len(), 1);
    }

    #[tokio::test]
    async fn test_accept_revoked() {
        let f = fixture().await;
        let invitation_id = seed_invitation(&f, Utc::now() + Duration::days(7)).await;
        f.invitations
            .set_status(invitation_id, InvitationStatus::Revoked)
            .await
            .unwrap();

        let err = action(&f)
            .execute(&SecretString::new(TOKEN), f.invitee_id)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvitationRevoked);
        assert!(f.memberships.find_by_team(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_accept_as_existing_member() {
        let f = fixture().await;
        let invitation_id = seed_invitation(&f, Utc::now() + Duration::days(7)).await;

        f.memberships
            .create(crate::teams::CreateMembership {
                team_id: 1,
                user_id: f.invitee_id,
                role: Role::Member,
            })
            .await
            .unwrap();

        let output = action(&f)
            .execute(&SecretString::new(TOKEN), f.invitee_id)
            .await
            .unwrap();

        assert!(output.is_existing_member);
        assert!(output.membership.is_none());

        // no duplicate row, and the invite is consumed
        assert_eq!(f.memberships.find_by_team(1).await.unwrap().len(), 1);
        let invitation = f
            .invitations
            .find_by_id(invitation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(invitation.status, InvitationStatus::Accepted);
    }
}
