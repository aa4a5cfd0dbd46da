//! Shared test world: an in-memory identity platform plus every mock
//! repository, wired the way one browser profile would be, with a
//! service instance per tab.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use warrant::config::WarrantConfig;
use warrant::identity::{IdentityProvider, InMemoryIdentityPlatform, UserSummary};
use warrant::impersonation::{
    MockImpersonationLockRepository, MockImpersonationSessionRepository,
};
use warrant::roles::Role;
use warrant::service::Repositories;
use warrant::session::InMemoryPointerStore;
use warrant::sync::{SyncBus, TabRegistry};
use warrant::teams::{
    CreateMembership, CreateTeam, MockTeamInvitationRepository, MockTeamMembershipRepository,
    MockTeamRepository, TeamMembershipRepository, TeamRepository,
};
use warrant::{AuthService, SecretString};

pub const PASSWORD: &str = "hunter2hunter2";

pub struct World {
    pub platform: Arc<InMemoryIdentityPlatform>,
    pub teams: Arc<MockTeamRepository>,
    pub memberships: Arc<MockTeamMembershipRepository>,
    pub invitations: Arc<MockTeamInvitationRepository>,
    pub impersonations: Arc<MockImpersonationSessionRepository>,
    pub locks: Arc<MockImpersonationLockRepository>,
    pub bus: SyncBus,
    pub registry: Arc<TabRegistry>,
}

impl World {
    pub fn new() -> Self {
        Self {
            platform: Arc::new(
                InMemoryIdentityPlatform::new("test-secret-32-bytes-long-key-01").unwrap(),
            ),
            teams: Arc::new(MockTeamRepository::new()),
            memberships: Arc::new(MockTeamMembershipRepository::new()),
            invitations: Arc::new(MockTeamInvitationRepository::new()),
            impersonations: Arc::new(MockImpersonationSessionRepository::new()),
            locks: Arc::new(MockImpersonationLockRepository::new()),
            bus: SyncBus::new(),
            registry: Arc::new(TabRegistry::new(Duration::minutes(5))),
        }
    }

    /// A new tab of this browser profile.
    pub fn open_tab(&self, tab_id: Uuid) -> AuthService<Arc<InMemoryIdentityPlatform>> {
        AuthService::new(
            self.platform.clone(),
            Repositories {
                teams: self.teams.clone(),
                memberships: self.memberships.clone(),
                invitations: self.invitations.clone(),
                impersonation_sessions: self.impersonations.clone(),
                impersonation_locks: self.locks.clone(),
                pointer_store: Arc::new(InMemoryPointerStore::new()),
            },
            self.bus.clone(),
            self.registry.clone(),
            WarrantConfig::default(),
            tab_id,
            "/app",
        )
        .unwrap()
    }

    pub fn register_super_admin(&self, email: &str) -> UserSummary {
        self.platform
            .register_user(email, "Super Admin", PASSWORD, Some(Role::SuperAdmin), true)
            .unwrap()
    }

    pub fn register_user(&self, email: &str) -> UserSummary {
        self.platform
            .register_user(email, "User", PASSWORD, None, false)
            .unwrap()
    }

    pub async fn seed_team(&self, slug: &str, owner_id: Uuid) -> i64 {
        let team = self
            .teams
            .create(CreateTeam {
                name: slug.to_owned(),
                slug: slug.to_owned(),
                owner_id,
            })
            .await
            .unwrap();
        self.memberships
            .create(CreateMembership {
                team_id: team.id,
                user_id: owner_id,
                role: Role::Owner,
            })
            .await
            .unwrap();
        team.id
    }

    pub async fn add_member(&self, team_id: i64, user_id: Uuid, role: Role) {
        self.memberships
            .create(CreateMembership {
                team_id,
                user_id,
                role,
            })
            .await
            .unwrap();
    }
}

pub fn password() -> SecretString {
    SecretString::new(PASSWORD)
}

pub async fn signed_in_tab(
    world: &World,
    email: &str,
) -> AuthService<Arc<InMemoryIdentityPlatform>> {
    let tab = world.open_tab(Uuid::new_v4());
    tab.sign_in(email, &password()).await.unwrap();
    tab
}

/// Introspects a tab's current credential through the platform.
pub async fn introspect_tab(
    world: &World,
    tab: &AuthService<Arc<InMemoryIdentityPlatform>>,
) -> warrant::identity::IntrospectedSession {
    let token = tab.access_token().await.unwrap();
    world.platform.introspect(&token).await.unwrap()
}
