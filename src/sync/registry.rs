//! Active-tab registry and primary election.
//!
//! Each tab registers itself and refreshes its row periodically.
//! Registrations unseen past the TTL are pruned. Any tab can enumerate
//! the open tabs and deterministically elect a primary (the earliest
//! registration, with the tab id as tiebreak) so recovery broadcasts
//! are not duplicated by every tab at once.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AuthError;

/// One open tab's registry row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabRegistration {
    pub tab_id: Uuid,
    pub registered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub url: String,
}

/// Shared registry of open tabs for one browser profile.
pub struct TabRegistry {
    tabs: RwLock<HashMap<Uuid, TabRegistration>>,
    ttl: Duration,
}

impl TabRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            tabs: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Registers a tab, or refreshes it if already present.
    pub fn register(&self, tab_id: Uuid, url: &str) -> Result<(), AuthError> {
        let now = Utc::now();
        let mut tabs = self
            .tabs
            .write()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;

        tabs.entry(tab_id)
            .and_modify(|t| {
                t.last_seen = now;
                url.clone_into(&mut t.url);
            })
            .or_insert_with(|| TabRegistration {
                tab_id,
                registered_at: now,
                last_seen: now,
                url: url.to_owned(),
            });

        Ok(())
    }

    /// Heartbeat: refreshes `last_seen` for a registered tab.
    pub fn heartbeat(&self, tab_id: Uuid) -> Result<(), AuthError> {
        let mut tabs = self
            .tabs
            .write()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;

        match tabs.get_mut(&tab_id) {
            Some(tab) => {
                tab.last_seen = Utc::now();
                Ok(())
            }
            None => Err(AuthError::NotFound),
        }
    }

    /// Removes a tab on close.
    pub fn deregister(&self, tab_id: Uuid) -> Result<(), AuthError> {
        let mut tabs = self
            .tabs
            .write()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;
        tabs.remove(&tab_id);
        Ok(())
    }

    /// Drops registrations unseen past the TTL. Returns how many.
    pub fn prune(&self) -> Result<usize, AuthError> {
        let cutoff = Utc::now() - self.ttl;
        let mut tabs = self
            .tabs
            .write()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;

        let before = tabs.len();
        tabs.retain(|_, t| t.last_seen >= cutoff);
        Ok(before - tabs.len())
    }

    /// The currently live registrations (TTL applied at read time).
    pub fn active_tabs(&self) -> Result<Vec<TabRegistration>, AuthError> {
        let cutoff = Utc::now() - self.ttl;
        let tabs = self
            .tabs
            .read()
            .map_err(|_| AuthError::Internal("lock poisoned".into()))?;

        let mut active: Vec<TabRegistration> = tabs
            .values()
            .filter(|t| t.last_seen >= cutoff)
            .cloned()
            .collect();
        active.sort_by_key(|t| (t.registered_at, t.tab_id));
        Ok(active)
    }

    /// Elects the primary tab: earliest registration, tab id tiebreak.
    ///
    /// Deterministic across tabs looking at the same registry state, so
    /// exactly one tab takes responsibility for recovery broadcasts.
    pub fn elect_primary(&self) -> Result<Option<Uuid>, AuthError> {
        Ok(self.active_tabs()?.first().map(|t| t.tab_id))
    }

    /// True when the given tab is the elected primary.
    pub fn is_primary(&self, tab_id: Uuid) -> Result<bool, AuthError> {
        Ok(self.elect_primary()? == Some(tab_id))
    }
}
