//! Client-exposed service facade.
//!
//! One `AuthService` is an explicit context object for one top-level
//! session (one tab): it owns the tab's session store, its bearer pair,
//! and the orchestrator, and exposes the operation surface the
//! application calls. Construct it at tab load, call [`AuthService::teardown`]
//! when the tab goes away. There is no process-wide singleton.
//!
//! Every operation fails with a structured [`ErrorResponse`]
//! `{code, message}`; raw platform errors never cross this boundary.
//! Upstream failures are always logged.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::WarrantConfig;
use crate::crypto::SecretString;
use crate::events::{dispatch, AuthEvent};
use crate::identity::{IdentityProvider, UserSummary};
use crate::impersonation::{
    ImpersonationLockRepository, ImpersonationSessionRepository, Orchestrator,
};
use crate::roles::{require_role, Role};
use crate::session::{
    initialize_session, HealthIssue, ImpersonationPointerStore, SessionSnapshot, SessionStore,
};
use crate::sync::{SyncBus, SyncEnvelope, SyncEventKind, SyncSubscriber, TabRegistry};
use crate::teams::{
    AcceptInvitationAction, InviteMemberAction, InviteMemberInput, PromoteMemberAction,
    PromoteMemberInput, RemoveMemberAction, RemoveMemberInput, RevokeInvitationAction,
    RevokeInvitationInput, TeamInvitationRepository, TeamMembershipRepository, TeamRepository,
    TransferOwnershipAction, TransferOwnershipInput,
};
use crate::token::TokenPair;
use crate::{AuthError, ErrorResponse};

/// Storage seams behind the facade.
pub struct Repositories {
    pub teams: Arc<dyn TeamRepository>,
    pub memberships: Arc<dyn TeamMembershipRepository>,
    pub invitations: Arc<dyn TeamInvitationRepository>,
    pub impersonation_sessions: Arc<dyn ImpersonationSessionRepository>,
    pub impersonation_locks: Arc<dyn ImpersonationLockRepository>,
    pub pointer_store: Arc<dyn ImpersonationPointerStore>,
}

/// Per-tab service facade.
pub struct AuthService<P: IdentityProvider + Clone> {
    provider: P,
    teams: Arc<dyn TeamRepository>,
    memberships: Arc<dyn TeamMembershipRepository>,
    invitations: Arc<dyn TeamInvitationRepository>,
    orchestrator: Orchestrator<
        P,
        Arc<dyn ImpersonationSessionRepository>,
        Arc<dyn ImpersonationLockRepository>,
        Arc<dyn ImpersonationPointerStore>,
    >,
    store: Arc<SessionStore>,
    registry: Arc<TabRegistry>,
    bus: SyncBus,
    config: WarrantConfig,
    tokens: RwLock<Option<TokenPair>>,
}

impl<P: IdentityProvider + Clone> AuthService<P> {
    /// Creates the service for one tab and registers it.
    pub fn new(
        provider: P,
        repos: Repositories,
        bus: SyncBus,
        registry: Arc<TabRegistry>,
        config: WarrantConfig,
        tab_id: Uuid,
        url: &str,
    ) -> Result<Self, AuthError> {
        registry.register(tab_id, url)?;

        let store = Arc::new(SessionStore::new(tab_id));
        let orchestrator = Orchestrator::new(
            provider.clone(),
            repos.impersonation_sessions,
            repos.impersonation_locks,
            store.clone(),
            bus.clone(),
            repos.pointer_store,
            config.sync.clone(),
        );

        Ok(Self {
            provider,
            teams: repos.teams,
            memberships: repos.memberships,
            invitations: repos.invitations,
            orchestrator,
            store,
            registry,
            bus,
            config,
            tokens: RwLock::new(None),
        })
    }

    // --- snapshot getters ---

    pub fn snapshot(&self) -> SessionSnapshot {
        self.store.snapshot()
    }

    pub fn current_user(&self) -> Option<UserSummary> {
        self.store.snapshot().user
    }

    pub fn current_team(&self) -> Option<i64> {
        self.store.snapshot().team_id
    }

    pub fn current_role(&self) -> Option<Role> {
        self.store.snapshot().role
    }

    pub fn is_impersonating(&self) -> bool {
        self.store.snapshot().is_impersonating()
    }

    pub fn impersonation_expires_at(&self) -> Option<DateTime<Utc>> {
        self.store.snapshot().impersonation_expires_at()
    }

    /// The current access token, if signed in.
    pub async fn access_token(&self) -> Option<String> {
        self.tokens
            .read()
            .await
            .as_ref()
            .map(|p| p.access_token.clone())
    }

    // --- authentication ---

    /// Signs in and rebuilds the tab's snapshot from the platform.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<UserSummary, ErrorResponse> {
        let (pair, user) = self
            .provider
            .sign_in_with_password(email, password)
            .await
            .map_err(surface)?;

        let mut snapshot = initialize_session(
            &self.provider,
            self.orchestrator.pointer_store(),
            self.store.tab_id(),
            &pair.access_token,
            &self.config.init_poll,
        )
        .await
        .map_err(surface)?;

        // default team: the longest-standing membership, when one exists
        if let Some(effective) = &snapshot.user {
            let memberships = self
                .memberships
                .find_by_user(effective.id)
                .await
                .map_err(surface)?;
            if let Some(first) = memberships.first() {
                snapshot.team_id = Some(first.team_id);
                snapshot.role = Some(first.role);
            }
        }

        *self.tokens.write().await = Some(pair);
        self.store.replace(snapshot);
        let _ = self.registry.heartbeat(self.store.tab_id());

        dispatch(AuthEvent::SignInSuccess {
            user_id: user.id,
            email: user.email.clone(),
            at: Utc::now(),
        })
        .await;

        self.broadcast(SyncEventKind::StateChanged);
        Ok(user)
    }

    /// Signs out. Local state clears even when the platform call fails.
    pub async fn sign_out(&self) -> Result<(), ErrorResponse> {
        let user_id = self.current_user().map(|u| u.id);

        if let Some(token) = self.access_token().await {
            if let Err(err) = self.provider.sign_out(&token).await {
                log::warn!(
                    target: "warrant",
                    "msg=\"platform sign-out failed, clearing locally\", error=\"{err:?}\""
                );
            }
        }

        *self.tokens.write().await = None;
        self.store
            .replace(SessionSnapshot::empty(self.store.tab_id()));

        if let Some(user_id) = user_id {
            dispatch(AuthEvent::SignOut {
                user_id,
                at: Utc::now(),
            })
            .await;
        }

        self.broadcast(SyncEventKind::SignedOut);
        Ok(())
    }

    /// Switches the current team, resolving the effective user's role.
    pub async fn select_team(&self, team_id: i64) -> Result<(), ErrorResponse> {
        let user = self.require_user()?;

        let membership = self
            .memberships
            .find_by_team_and_user(team_id, user.id)
            .await
            .map_err(surface)?
            .ok_or_else(|| surface(AuthError::Forbidden))?;

        self.store.update(|s| {
            s.team_id = Some(team_id);
            s.role = Some(membership.role);
        });

        self.broadcast(SyncEventKind::StateChanged);
        Ok(())
    }

    // --- team operations ---

    /// Invites `email` to the current team. Returns the one-time token.
    pub async fn invite_member(
        &self,
        email: &str,
        role: Role,
    ) -> Result<SecretString, ErrorResponse> {
        let user = self.require_user()?;
        let team_id = self.require_team()?;
        require_role(self.store.snapshot().effective_role(), Role::Admin).map_err(surface)?;

        let action = InviteMemberAction::with_config(
            self.provider.clone(),
            self.teams.clone(),
            self.memberships.clone(),
            self.invitations.clone(),
            self.config.invitations.clone(),
            self.config.token_length,
        );

        let output = action
            .execute(InviteMemberInput {
                team_id,
                email: email.to_owned(),
                role,
                invited_by: user.id,
            })
            .await
            .map_err(surface)?;

        Ok(output.token)
    }

    /// Accepts an invitation token for the signed-in user.
    ///
    /// Returns whether the user was already a member.
    pub async fn accept_invitation(&self, token: &SecretString) -> Result<bool, ErrorResponse> {
        let user = self.require_user()?;

        let action = AcceptInvitationAction::new(
            self.provider.clone(),
            self.invitations.clone(),
            self.memberships.clone(),
        );

        let output = action.execute(token, user.id).await.map_err(surface)?;

        // joining a team makes it current when none is selected
        if let Some(membership) = &output.membership {
            if self.current_team().is_none() {
                self.store.update(|s| {
                    s.team_id = Some(membership.team_id);
                    s.role = Some(membership.role);
                });
                self.broadcast(SyncEventKind::StateChanged);
            }
        }

        Ok(output.is_existing_member)
    }

    /// Revokes a pending invitation in the current team.
    pub async fn revoke_invitation(&self, invitation_id: i64) -> Result<(), ErrorResponse> {
        let user = self.require_user()?;
        require_role(self.store.snapshot().effective_role(), Role::Admin).map_err(surface)?;

        RevokeInvitationAction::new(self.invitations.clone(), self.memberships.clone())
            .execute(RevokeInvitationInput {
                invitation_id,
                revoked_by: user.id,
            })
            .await
            .map_err(surface)
    }

    /// Changes a member's role in the current team.
    pub async fn promote(
        &self,
        target_user_id: Uuid,
        new_role: Role,
    ) -> Result<(), ErrorResponse> {
        let user = self.require_user()?;
        let team_id = self.require_team()?;
        require_role(self.store.snapshot().effective_role(), Role::Admin).map_err(surface)?;

        PromoteMemberAction::new(self.memberships.clone())
            .execute(PromoteMemberInput {
                team_id,
                actor_id: user.id,
                target_user_id,
                new_role,
            })
            .await
            .map(|_| ())
            .map_err(surface)
    }

    /// Transfers ownership of the current team.
    pub async fn transfer_ownership(&self, new_owner_id: Uuid) -> Result<(), ErrorResponse> {
        let user = self.require_user()?;
        let team_id = self.require_team()?;
        require_role(self.store.snapshot().effective_role(), Role::Owner).map_err(surface)?;

        TransferOwnershipAction::new(self.teams.clone(), self.memberships.clone())
            .execute(TransferOwnershipInput {
                team_id,
                current_owner_id: user.id,
                new_owner_id,
            })
            .await
            .map_err(surface)?;

        // the caller just became an admin
        self.store.update(|s| s.role = Some(Role::Admin));
        self.broadcast(SyncEventKind::StateChanged);
        Ok(())
    }

    /// Removes a member from the current team.
    pub async fn remove_member(&self, target_user_id: Uuid) -> Result<(), ErrorResponse> {
        let user = self.require_user()?;
        let team_id = self.require_team()?;

        RemoveMemberAction::new(self.memberships.clone())
            .execute(RemoveMemberInput {
                team_id,
                actor_id: user.id,
                target_user_id,
            })
            .await
            .map_err(surface)
    }

    // --- impersonation ---

    /// Starts impersonating `target_user_id`. The tab's bearer pair is
    /// swapped for the scoped credential.
    pub async fn start_impersonation(
        &self,
        target_user_id: Uuid,
        reason: &str,
    ) -> Result<(), ErrorResponse> {
        let token = self
            .access_token()
            .await
            .ok_or_else(|| surface(AuthError::TokenInvalid))?;

        let output = self
            .orchestrator
            .start(&token, target_user_id, reason)
            .await
            .map_err(surface)?;

        *self.tokens.write().await = Some(output.session);
        Ok(())
    }

    /// Stops the active impersonation and returns to the admin identity
    /// on a freshly minted pair.
    pub async fn stop_impersonation(&self) -> Result<(), ErrorResponse> {
        let token = self
            .access_token()
            .await
            .ok_or_else(|| surface(AuthError::TokenInvalid))?;

        match self.orchestrator.stop(&token).await {
            Ok(Some(pair)) => {
                *self.tokens.write().await = Some(pair);
                Ok(())
            }
            // another tab already stopped it; the scoped pair is dead
            Ok(None) => {
                *self.tokens.write().await = None;
                Ok(())
            }
            // nothing was active in this tab; the held credential stands
            Err(err @ AuthError::NotFound) => Err(surface(err)),
            Err(err) => {
                // local state is already reset by the orchestrator; the
                // credential situation is unknown, so drop the pair
                *self.tokens.write().await = None;
                Err(surface(err))
            }
        }
    }

    // --- synchronization & health ---

    /// This tab's filtered subscription to cross-tab envelopes.
    pub fn subscribe_sync(&self) -> SyncSubscriber {
        self.orchestrator.subscribe()
    }

    /// Adopts state broadcast by another tab.
    pub async fn apply_envelope(&self, envelope: SyncEnvelope) {
        self.orchestrator.apply_envelope(envelope).await;
    }

    /// Advisory local expiry check; see the orchestrator.
    pub fn detect_local_expiry(&self) -> bool {
        self.orchestrator.detect_local_expiry()
    }

    /// Runs the health check, recovering and broadcasting when needed.
    pub async fn run_health_check(&self) -> Result<Vec<HealthIssue>, ErrorResponse> {
        self.orchestrator
            .recover_if_unhealthy(&self.registry)
            .await
            .map_err(surface)
    }

    /// Heartbeat + registry prune; call on a timer.
    pub fn keep_alive(&self) {
        let _ = self.registry.heartbeat(self.store.tab_id());
        let _ = self.registry.prune();
    }

    /// Deregisters the tab. Call when the tab closes.
    pub fn teardown(&self) {
        let _ = self.registry.deregister(self.store.tab_id());
    }

    // --- helpers ---

    fn require_user(&self) -> Result<UserSummary, ErrorResponse> {
        self.current_user()
            .ok_or_else(|| surface(AuthError::InvalidCredentials))
    }

    fn require_team(&self) -> Result<i64, ErrorResponse> {
        self.current_team()
            .ok_or_else(|| surface(AuthError::LocalState("No team selected".to_owned())))
    }

    fn broadcast(&self, event: SyncEventKind) {
        if let Err(err) = self
            .bus
            .publish(event, self.store.snapshot(), self.store.tab_id())
        {
            log::warn!(
                target: "warrant",
                "msg=\"broadcast failed\", event={event:?}, error=\"{err:?}\""
            );
        }
    }
}

/// Maps an internal error onto the wire shape, logging upstream failures.
fn surface(err: AuthError) -> ErrorResponse {
    if matches!(err, AuthError::Upstream(_) | AuthError::Internal(_)) {
        log::error!(target: "warrant", "msg=\"operation failed\", error=\"{err:?}\"");
    }
    ErrorResponse::from(err)
}
