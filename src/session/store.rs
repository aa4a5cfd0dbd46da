use chrono::Utc;
use tokio::sync::watch;
use uuid::Uuid;

use super::{Phase, SessionSnapshot};
use crate::AuthError;

/// Reactive holder for a tab's session snapshot.
///
/// Consumers subscribe through the watch channel and react to complete
/// snapshots. All mutation goes through [`SessionStore::replace`] or the
/// validated phase helpers; there is no field-level mutation surface.
pub struct SessionStore {
    tx: watch::Sender<SessionSnapshot>,
}

impl SessionStore {
    pub fn new(tab_id: Uuid) -> Self {
        let (tx, _) = watch::channel(SessionSnapshot::empty(tab_id));
        Self { tx }
    }

    pub fn tab_id(&self) -> Uuid {
        self.tx.borrow().tab_id
    }

    /// Current snapshot (cloned; the store never hands out references).
    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    /// Subscribe to snapshot replacements.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    /// Replaces the snapshot wholesale, stamping `updated_at`.
    ///
    /// Used for rebuilds and for adopting remote state; phase edges are
    /// not validated here because the incoming state is already complete.
    pub fn replace(&self, mut next: SessionSnapshot) {
        next.updated_at = Utc::now();
        // send only errs when every receiver is gone; the store itself
        // still holds the latest value, so that is not a failure.
        let _ = self.tx.send(next);
    }

    /// Builds the next snapshot from the current one and replaces it.
    pub fn update(&self, f: impl FnOnce(&mut SessionSnapshot)) {
        let mut next = self.snapshot();
        f(&mut next);
        self.replace(next);
    }

    /// Moves to a new phase, validating the edge.
    pub fn transition(&self, to: Phase) -> Result<(), AuthError> {
        let current = self.snapshot();
        if !current.phase.can_transition(to) {
            return Err(AuthError::LocalState(format!(
                "illegal phase transition {:?} -> {to:?}",
                current.phase
            )));
        }
        self.update(|s| s.phase = to);
        Ok(())
    }

    /// Marks the session locally expired if the recorded expiry has
    /// passed while still `Active`. Returns whether it transitioned.
    pub fn note_expiry_if_due(&self) -> bool {
        let current = self.snapshot();
        if current.phase != Phase::Active {
            return false;
        }
        match current.impersonation_expires_at() {
            Some(expires_at) if expires_at < Utc::now() => {
                self.update(|s| s.phase = Phase::ExpiredLocally);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::identity::UserSummary;
    use crate::session::ImpersonationMarker;

    fn marker(expires_at: Option<chrono::DateTime<Utc>>) -> ImpersonationMarker {
        ImpersonationMarker {
            session_id: Uuid::new_v4(),
            admin_user_id: Uuid::new_v4(),
            target: UserSummary {
                id: Uuid::new_v4(),
                email: "u@example.com".to_owned(),
                name: "U".to_owned(),
                role: None,
            },
            expires_at,
        }
    }

    #[test]
    fn test_observers_see_complete_snapshots() {
        let store = SessionStore::new(Uuid::new_v4());
        let rx = store.subscribe();

        store.update(|s| {
            s.team_id = Some(7);
            s.role = Some(crate::roles::Role::Member);
        });

        let seen = rx.borrow().clone();
        // both fields landed together
        assert_eq!(seen.team_id, Some(7));
        assert_eq!(seen.role, Some(crate::roles::Role::Member));
    }

    #[test]
    fn test_transition_validates_edges() {
        let store = SessionStore::new(Uuid::new_v4());

        assert!(store.transition(Phase::Starting).is_ok());
        assert!(store.transition(Phase::Active).is_ok());
        assert!(store.transition(Phase::Stopping).is_ok());
        assert!(store.transition(Phase::Idle).is_ok());

        let err = store.transition(Phase::Active).unwrap_err();
        assert!(matches!(err, AuthError::LocalState(_)));
    }

    #[test]
    fn test_note_expiry_transitions_only_when_due() {
        let store = SessionStore::new(Uuid::new_v4());
        store.update(|s| {
            s.phase = Phase::Active;
            s.impersonation = Some(marker(Some(Utc::now() + Duration::minutes(30))));
        });

        assert!(!store.note_expiry_if_due());
        assert_eq!(store.snapshot().phase, Phase::Active);

        store.update(|s| {
            s.impersonation = Some(marker(Some(Utc::now() - Duration::seconds(1))));
        });

        assert!(store.note_expiry_if_due());
        assert_eq!(store.snapshot().phase, Phase::ExpiredLocally);

        // already expired: no second transition
        assert!(!store.note_expiry_if_due());
    }
}
