use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::ImpersonationSession;
use crate::AuthError;

#[derive(Debug, Clone)]
pub struct CreateImpersonationSession {
    pub admin_user_id: Uuid,
    pub target_user_id: Uuid,
    pub reason: String,
}

/// Storage for the append-only impersonation audit trail.
///
/// There is deliberately no delete: rows are closed, never removed.
#[async_trait]
pub trait ImpersonationSessionRepository: Send + Sync {
    async fn create(
        &self,
        data: CreateImpersonationSession,
    ) -> Result<ImpersonationSession, AuthError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ImpersonationSession>, AuthError>;

    /// Open rows for an admin (should be at most one; see the start
    /// action's replace-never-stack handling).
    async fn find_active_by_admin(
        &self,
        admin_user_id: Uuid,
    ) -> Result<Vec<ImpersonationSession>, AuthError>;

    /// Sets `ended_at` on an open row.
    ///
    /// Returns `NotFound` when there is no *open* row with that id;
    /// closing twice is not a second mutation.
    async fn close(
        &self,
        id: Uuid,
        ended_at: DateTime<Utc>,
    ) -> Result<ImpersonationSession, AuthError>;

    /// Open rows started before `cutoff`, i.e. past their expiry when
    /// `cutoff = now - TTL`. Feeds the operational sweep.
    async fn find_open_started_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ImpersonationSession>, AuthError>;
}

/// Short-lived `resolving_conflict` lock so only one start attempt per
/// admin proceeds when several tabs race. Losers observe the winner's
/// broadcast instead of starting their own session.
#[async_trait]
pub trait ImpersonationLockRepository: Send + Sync {
    /// Tries to take the lock. Returns `false` while another holder's
    /// lock is live.
    async fn acquire(&self, admin_user_id: Uuid, ttl: Duration) -> Result<bool, AuthError>;

    async fn release(&self, admin_user_id: Uuid) -> Result<(), AuthError>;
}

#[async_trait]
impl<R: ImpersonationSessionRepository + ?Sized> ImpersonationSessionRepository for Arc<R> {
    async fn create(
        &self,
        data: CreateImpersonationSession,
    ) -> Result<ImpersonationSession, AuthError> {
        (**self).create(data).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ImpersonationSession>, AuthError> {
        (**self).find_by_id(id).await
    }

    async fn find_active_by_admin(
        &self,
        admin_user_id: Uuid,
    ) -> Result<Vec<ImpersonationSession>, AuthError> {
        (**self).find_active_by_admin(admin_user_id).await
    }

    async fn close(
        &self,
        id: Uuid,
        ended_at: DateTime<Utc>,
    ) -> Result<ImpersonationSession, AuthError> {
        (**self).close(id, ended_at).await
    }

    async fn find_open_started_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ImpersonationSession>, AuthError> {
        (**self).find_open_started_before(cutoff).await
    }
}

#[async_trait]
impl<L: ImpersonationLockRepository + ?Sized> ImpersonationLockRepository for Arc<L> {
    async fn acquire(&self, admin_user_id: Uuid, ttl: Duration) -> Result<bool, AuthError> {
        (**self).acquire(admin_user_id, ttl).await
    }

    async fn release(&self, admin_user_id: Uuid) -> Result<(), AuthError> {
        (**self).release(admin_user_id).await
    }
}

/// Shared guard: `ended_at`, once set, must be >= `started_at`.
pub(crate) fn clamp_ended_at(
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
) -> DateTime<Utc> {
    ended_at.max(started_at)
}
