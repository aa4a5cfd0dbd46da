#![allow(clippy::significant_drop_tightening)]

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::repository::{
    clamp_ended_at, CreateImpersonationSession, ImpersonationLockRepository,
    ImpersonationSessionRepository,
};
use super::ImpersonationSession;
use crate::AuthError;

pub struct MockImpersonationSessionRepository {
    sessions: RwLock<HashMap<Uuid, ImpersonationSession>>,
}

impl MockImpersonationSessionRepository {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// All rows, for assertions about the audit trail.
    pub fn all(&self) -> Vec<ImpersonationSession> {
        self.sessions
            .read()
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Test helper: rewrites a row's start time so expiry-dependent
    /// behavior can be exercised without waiting out the TTL.
    pub fn backdate(&self, id: Uuid, started_at: DateTime<Utc>) {
        if let Ok(mut sessions) = self.sessions.write() {
            if let Some(session) = sessions.get_mut(&id) {
                session.started_at = started_at;
            }
        }
    }
}

impl Default for MockImpersonationSessionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImpersonationSessionRepository for MockImpersonationSessionRepository {
    async fn create(
        &self,
        data: CreateImpersonationSession,
    ) -> Result<ImpersonationSession, AuthError> {
        let session = ImpersonationSession {
            id: Uuid::new_v4(),
            admin_user_id: data.admin_user_id,
            target_user_id: data.target_user_id,
            started_at: Utc::now(),
            ended_at: None,
            reason: data.reason,
        };

        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
        sessions.insert(session.id, session.clone());

        Ok(session)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ImpersonationSession>, AuthError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
        Ok(sessions.get(&id).cloned())
    }

    async fn find_active_by_admin(
        &self,
        admin_user_id: Uuid,
    ) -> Result<Vec<ImpersonationSession>, AuthError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
        Ok(sessions
            .values()
            .filter(|s| s.admin_user_id == admin_user_id && s.is_active())
            .cloned()
            .collect())
    }

    async fn close(
        &self,
        id: Uuid,
        ended_at: DateTime<Utc>,
    ) -> Result<ImpersonationSession, AuthError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;

        match sessions.get_mut(&id) {
            Some(session) if session.is_active() => {
                session.ended_at = Some(clamp_ended_at(session.started_at, ended_at));
                Ok(session.clone())
            }
            // no open row with that id: absent or already closed
            _ => Err(AuthError::NotFound),
        }
    }

    async fn find_open_started_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ImpersonationSession>, AuthError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
        Ok(sessions
            .values()
            .filter(|s| s.is_active() && s.started_at < cutoff)
            .cloned()
            .collect())
    }
}

pub struct MockImpersonationLockRepository {
    locks: RwLock<HashMap<Uuid, DateTime<Utc>>>,
}

impl MockImpersonationLockRepository {
    pub fn new() -> Self {
        Self {
            locks: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MockImpersonationLockRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImpersonationLockRepository for MockImpersonationLockRepository {
    async fn acquire(&self, admin_user_id: Uuid, ttl: Duration) -> Result<bool, AuthError> {
        let now = Utc::now();
        let mut locks = self
            .locks
            .write()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;

        match locks.get(&admin_user_id) {
            Some(expires_at) if *expires_at > now => Ok(false),
            _ => {
                locks.insert(admin_user_id, now + ttl);
                Ok(true)
            }
        }
    }

    async fn release(&self, admin_user_id: Uuid) -> Result<(), AuthError> {
        let mut locks = self
            .locks
            .write()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
        locks.remove(&admin_user_id);
        Ok(())
    }
}
