#![allow(clippy::significant_drop_tightening)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::repository::{
    is_live_pending, CreateInvitation, CreateMembership, CreateTeam, TeamInvitationRepository,
    TeamMembershipRepository, TeamRepository,
};
use super::types::{InvitationStatus, Team, TeamInvitation, TeamMembership};
use crate::roles::Role;
use crate::AuthError;

pub struct MockTeamRepository {
    teams: RwLock<HashMap<i64, Team>>,
    next_id: AtomicI64,
}

impl MockTeamRepository {
    pub fn new() -> Self {
        Self {
            teams: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for MockTeamRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TeamRepository for MockTeamRepository {
    async fn create(&self, data: CreateTeam) -> Result<Team, AuthError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let team = Team {
            id,
            name: data.name,
            slug: data.slug,
            owner_id: data.owner_id,
            created_at: now,
            updated_at: now,
        };

        let mut teams = self
            .teams
            .write()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
        teams.insert(id, team.clone());

        Ok(team)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Team>, AuthError> {
        let teams = self
            .teams
            .read()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
        Ok(teams.get(&id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Team>, AuthError> {
        let teams = self
            .teams
            .read()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
        Ok(teams.values().find(|t| t.slug == slug).cloned())
    }

    async fn set_owner(&self, team_id: i64, new_owner_id: Uuid) -> Result<Team, AuthError> {
        let mut teams = self
            .teams
            .write()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;

        let team = teams.get_mut(&team_id).ok_or(AuthError::NotFound)?;
        team.owner_id = new_owner_id;
        team.updated_at = Utc::now();

        Ok(team.clone())
    }
}

pub struct MockTeamMembershipRepository {
    memberships: RwLock<HashMap<i64, TeamMembership>>,
    next_id: AtomicI64,
}

impl MockTeamMembershipRepository {
    pub fn new() -> Self {
        Self {
            memberships: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    fn owner_count(memberships: &HashMap<i64, TeamMembership>, team_id: i64) -> u64 {
        memberships
            .values()
            .filter(|m| m.team_id == team_id && m.role == Role::Owner)
            .count() as u64
    }
}

impl Default for MockTeamMembershipRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TeamMembershipRepository for MockTeamMembershipRepository {
    async fn create(&self, data: CreateMembership) -> Result<TeamMembership, AuthError> {
        if !data.role.is_team_role() {
            return Err(AuthError::RoleNotAssignable);
        }

        let mut memberships = self
            .memberships
            .write()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;

        // at-most-one-owner-per-team, enforced at the storage seam
        if data.role == Role::Owner && Self::owner_count(&memberships, data.team_id) > 0 {
            return Err(AuthError::SoleOwner);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let membership = TeamMembership {
            id,
            team_id: data.team_id,
            user_id: data.user_id,
            role: data.role,
            joined_at: now,
            updated_at: now,
        };
        memberships.insert(id, membership.clone());

        Ok(membership)
    }

    async fn find_by_team_and_user(
        &self,
        team_id: i64,
        user_id: Uuid,
    ) -> Result<Option<TeamMembership>, AuthError> {
        let memberships = self
            .memberships
            .read()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
        Ok(memberships
            .values()
            .find(|m| m.team_id == team_id && m.user_id == user_id)
            .cloned())
    }

    async fn find_by_team(&self, team_id: i64) -> Result<Vec<TeamMembership>, AuthError> {
        let memberships = self
            .memberships
            .read()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
        Ok(memberships
            .values()
            .filter(|m| m.team_id == team_id)
            .cloned()
            .collect())
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<TeamMembership>, AuthError> {
        let memberships = self
            .memberships
            .read()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
        let mut found: Vec<TeamMembership> = memberships
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by_key(|m| m.joined_at);
        Ok(found)
    }

    async fn update_role(&self, id: i64, role: Role) -> Result<TeamMembership, AuthError> {
        if !role.is_team_role() {
            return Err(AuthError::RoleNotAssignable);
        }

        let mut memberships = self
            .memberships
            .write()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;

        let team_id = memberships
            .get(&id)
            .map(|m| m.team_id)
            .ok_or(AuthError::NotFound)?;

        if role == Role::Owner {
            let other_owner = memberships
                .values()
                .any(|m| m.team_id == team_id && m.role == Role::Owner && m.id != id);
            if other_owner {
                return Err(AuthError::SoleOwner);
            }
        }

        let membership = memberships.get_mut(&id).ok_or(AuthError::NotFound)?;
        membership.role = role;
        membership.updated_at = Utc::now();

        Ok(membership.clone())
    }

    async fn delete_by_team_and_user(
        &self,
        team_id: i64,
        user_id: Uuid,
    ) -> Result<(), AuthError> {
        let mut memberships = self
            .memberships
            .write()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
        memberships.retain(|_, m| !(m.team_id == team_id && m.user_id == user_id));
        Ok(())
    }

    async fn count_owners(&self, team_id: i64) -> Result<u64, AuthError> {
        let memberships = self
            .memberships
            .read()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
        Ok(Self::owner_count(&memberships, team_id))
    }
}

pub struct MockTeamInvitationRepository {
    invitations: RwLock<HashMap<i64, TeamInvitation>>,
    next_id: AtomicI64,
}

impl MockTeamInvitationRepository {
    pub fn new() -> Self {
        Self {
            invitations: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for MockTeamInvitationRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TeamInvitationRepository for MockTeamInvitationRepository {
    async fn create(&self, data: CreateInvitation) -> Result<TeamInvitation, AuthError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let invitation = TeamInvitation {
            id,
            team_id: data.team_id,
            email: data.email,
            role: data.role,
            token_hash: data.token_hash,
            invited_by: data.invited_by,
            status: InvitationStatus::Pending,
            expires_at: data.expires_at,
            created_at: Utc::now(),
        };

        let mut invitations = self
            .invitations
            .write()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
        invitations.insert(id, invitation.clone());

        Ok(invitation)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<TeamInvitation>, AuthError> {
        let invitations = self
            .invitations
            .read()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
        Ok(invitations.get(&id).cloned())
    }

    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<TeamInvitation>, AuthError> {
        let invitations = self
            .invitations
            .read()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
        Ok(invitations
            .values()
            .find(|i| i.token_hash == token_hash)
            .cloned())
    }

    async fn find_pending_by_team_and_email(
        &self,
        team_id: i64,
        email: &str,
    ) -> Result<Option<TeamInvitation>, AuthError> {
        let invitations = self
            .invitations
            .read()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
        let now = Utc::now();
        Ok(invitations
            .values()
            .find(|i| i.team_id == team_id && i.email == email && is_live_pending(i, now))
            .cloned())
    }

    async fn find_pending_by_team(&self, team_id: i64) -> Result<Vec<TeamInvitation>, AuthError> {
        let invitations = self
            .invitations
            .read()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
        let now = Utc::now();
        Ok(invitations
            .values()
            .filter(|i| i.team_id == team_id && is_live_pending(i, now))
            .cloned()
            .collect())
    }

    async fn set_status(
        &self,
        id: i64,
        status: InvitationStatus,
    ) -> Result<TeamInvitation, AuthError> {
        let mut invitations = self
            .invitations
            .write()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;

        let invitation = invitations.get_mut(&id).ok_or(AuthError::NotFound)?;
        invitation.status = status;

        Ok(invitation.clone())
    }
}
