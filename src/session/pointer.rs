//! Reload persistence for the impersonation pointer.
//!
//! The full snapshot is rebuilt from the platform on every load; the
//! pointer is the one piece of client state that survives, so a reload
//! mid-impersonation lands back in the impersonated view instead of
//! silently reverting to the admin.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::AuthError;

/// The persisted pointer: ids and expiry only, never credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpersonationPointer {
    pub session_id: Uuid,
    pub admin_user_id: Uuid,
    pub target_user_id: Uuid,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Local persistence for the impersonation pointer.
#[async_trait]
pub trait ImpersonationPointerStore: Send + Sync {
    async fn save(&self, pointer: &ImpersonationPointer) -> Result<(), AuthError>;
    async fn load(&self) -> Result<Option<ImpersonationPointer>, AuthError>;
    async fn clear(&self) -> Result<(), AuthError>;
}

#[async_trait]
impl<S: ImpersonationPointerStore + ?Sized> ImpersonationPointerStore for Arc<S> {
    async fn save(&self, pointer: &ImpersonationPointer) -> Result<(), AuthError> {
        (**self).save(pointer).await
    }

    async fn load(&self) -> Result<Option<ImpersonationPointer>, AuthError> {
        (**self).load().await
    }

    async fn clear(&self) -> Result<(), AuthError> {
        (**self).clear().await
    }
}

/// In-memory pointer store.
pub struct InMemoryPointerStore {
    pointer: RwLock<Option<ImpersonationPointer>>,
}

impl InMemoryPointerStore {
    pub fn new() -> Self {
        Self {
            pointer: RwLock::new(None),
        }
    }
}

impl Default for InMemoryPointerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImpersonationPointerStore for InMemoryPointerStore {
    async fn save(&self, pointer: &ImpersonationPointer) -> Result<(), AuthError> {
        let mut slot = self
            .pointer
            .write()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
        *slot = Some(pointer.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<ImpersonationPointer>, AuthError> {
        let slot = self
            .pointer
            .read()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
        Ok(slot.clone())
    }

    async fn clear(&self) -> Result<(), AuthError> {
        let mut slot = self
            .pointer
            .write()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
        *slot = None;
        Ok(())
    }
}
