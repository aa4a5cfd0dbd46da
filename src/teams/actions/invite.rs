use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::config::InvitationConfig;
use crate::crypto::{generate_token, hash_token, SecretString};
use crate::events::{dispatch, AuthEvent};
use crate::identity::IdentityProvider;
use crate::roles::{can_invite_at_role, Role};
use crate::teams::{
    CreateInvitation, TeamInvitation, TeamInvitationRepository, TeamMembershipRepository,
    TeamRepository,
};
use crate::validators::validate_email;
use crate::AuthError;

/// Input data for creating a team invitation.
#[derive(Debug, Clone)]
pub struct InviteMemberInput {
    pub team_id: i64,
    pub email: String,
    pub role: Role,
    pub invited_by: Uuid,
}

/// Output from creating a team invitation.
#[derive(Debug)]
pub struct InviteMemberOutput {
    /// The created invitation record.
    pub invitation: TeamInvitation,
    /// The plain token to send to the invitee (not stored, only returned once).
    pub token: SecretString,
}

/// Action to invite a user to a team.
///
/// Conflicts (already a member, duplicate pending invite) are rejected
/// before any mutation. The returned token should be delivered to the
/// invitee; only its hash is persisted.
pub struct InviteMemberAction<P, T, M, I>
where
    P: IdentityProvider,
    T: TeamRepository,
    M: TeamMembershipRepository,
    I: TeamInvitationRepository,
{
    provider: P,
    team_repo: T,
    membership_repo: M,
    invitation_repo: I,
    config: InvitationConfig,
    token_length: usize,
}

impl<P, T, M, I> InviteMemberAction<P, T, M, I>
where
    P: IdentityProvider,
    T: TeamRepository,
    M: TeamMembershipRepository,
    I: TeamInvitationRepository,
{
    pub fn new(provider: P, team_repo: T, membership_repo: M, invitation_repo: I) -> Self {
        Self::with_config(
            provider,
            team_repo,
            membership_repo,
            invitation_repo,
            InvitationConfig::default(),
            crate::crypto::DEFAULT_TOKEN_LENGTH,
        )
    }

    pub fn with_config(
        provider: P,
        team_repo: T,
        membership_repo: M,
        invitation_repo: I,
        config: InvitationConfig,
        token_length: usize,
    ) -> Self {
        Self {
            provider,
            team_repo,
            membership_repo,
            invitation_repo,
            config,
            token_length,
        }
    }

    /// Creates an invitation.
    ///
    /// # Returns
    ///
    /// - `Ok(output)` - invitation created with the plain token for delivery
    /// - `Err(AuthError::NotFound)` - team does not exist
    /// - `Err(AuthError::Forbidden)` - inviter lacks the required rank
    /// - `Err(AuthError::RoleNotAssignable)` - owner/super_admin invite
    /// - `Err(AuthError::AlreadyMember)` - invitee already in the team
    /// - `Err(AuthError::DuplicateInvitation)` - live pending invite exists
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "invite_member", skip_all, err)
    )]
    pub async fn execute(&self, input: InviteMemberInput) -> Result<InviteMemberOutput, AuthError> {
        validate_email(&input.email)?;

        if self.team_repo.find_by_id(input.team_id).await?.is_none() {
            return Err(AuthError::NotFound);
        }

        // the inviter's team role decides what they may hand out;
        // inviting at admin is a promotion in disguise and needs an owner
        let inviter = self
            .membership_repo
            .find_by_team_and_user(input.team_id, input.invited_by)
            .await?
            .ok_or(AuthError::Forbidden)?;
        can_invite_at_role(inviter.role, input.role)?;

        // conflicts before any mutation
        if let Some(user) = self.provider.find_user_by_email(&input.email).await? {
            if self
                .membership_repo
                .find_by_team_and_user(input.team_id, user.id)
                .await?
                .is_some()
            {
                return Err(AuthError::AlreadyMember);
            }
        }

        if self
            .invitation_repo
            .find_pending_by_team_and_email(input.team_id, &input.email)
            .await?
            .is_some()
        {
            return Err(AuthError::DuplicateInvitation);
        }

        let token = generate_token(self.token_length);
        let token_hash = hash_token(&token);
        let expires_at = Utc::now() + Duration::days(self.config.expiry_days);

        let invitation = self
            .invitation_repo
            .create(CreateInvitation {
                team_id: input.team_id,
                email: input.email,
                role: input.role,
                token_hash,
                invited_by: input.invited_by,
                expires_at,
            })
            .await?;

        log::info!(
            target: "warrant",
            "msg=\"invitation created\", team_id={}, invitation_id={}, email=\"{}\"",
            invitation.team_id,
            invitation.id,
            invitation.email
        );

        dispatch(AuthEvent::InvitationCreated {
            team_id: invitation.team_id,
            email: invitation.email.clone(),
            at: Utc::now(),
        })
        .await;

        Ok(InviteMemberOutput {
            invitation,
            token: SecretString::new(token),
        })
    }
}
