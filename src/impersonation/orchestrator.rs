use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::repository::{ImpersonationLockRepository, ImpersonationSessionRepository};
use super::start::{StartImpersonationAction, StartImpersonationInput, StartImpersonationOutput};
use super::stop::StopImpersonationAction;
use crate::config::SyncConfig;
use crate::events::{dispatch, AuthEvent};
use crate::identity::IdentityProvider;
use crate::session::{
    check_session, HealthIssue, ImpersonationMarker, ImpersonationPointer,
    ImpersonationPointerStore, Phase, SessionSnapshot, SessionStore,
};
use crate::sync::{SyncBus, SyncEnvelope, SyncEventKind, SyncSubscriber, TabRegistry};
use crate::token::TokenPair;
use crate::AuthError;

/// Client-side impersonation orchestrator for one tab.
///
/// Owns the protocol around the start/stop actions: phase transitions on
/// the tab's [`SessionStore`], pointer persistence, broadcasts to other
/// tabs, local expiry detection, and recovery.
pub struct Orchestrator<P, R, L, S>
where
    P: IdentityProvider + Clone,
    R: ImpersonationSessionRepository + Clone,
    L: ImpersonationLockRepository,
    S: ImpersonationPointerStore,
{
    provider: P,
    start_action: StartImpersonationAction<P, R, L>,
    stop_action: StopImpersonationAction<P, R>,
    store: Arc<SessionStore>,
    bus: SyncBus,
    pointer_store: S,
    sync_config: SyncConfig,
}

impl<P, R, L, S> Orchestrator<P, R, L, S>
where
    P: IdentityProvider + Clone,
    R: ImpersonationSessionRepository + Clone,
    L: ImpersonationLockRepository,
    S: ImpersonationPointerStore,
{
    pub fn new(
        provider: P,
        sessions: R,
        locks: L,
        store: Arc<SessionStore>,
        bus: SyncBus,
        pointer_store: S,
        sync_config: SyncConfig,
    ) -> Self {
        Self {
            start_action: StartImpersonationAction::new(
                provider.clone(),
                sessions.clone(),
                locks,
            ),
            stop_action: StopImpersonationAction::new(provider.clone(), sessions),
            provider,
            store,
            bus,
            pointer_store,
            sync_config,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn pointer_store(&self) -> &S {
        &self.pointer_store
    }

    /// This tab's filtered subscription to the bus.
    pub fn subscribe(&self) -> SyncSubscriber {
        self.bus
            .subscribe(self.store.tab_id(), self.sync_config.staleness_window)
    }

    /// Starts impersonating `target_user_id`.
    ///
    /// `Idle → Starting → Active` on success, rolled back to `Idle` on
    /// failure. The new state is broadcast to other tabs.
    pub async fn start(
        &self,
        access_token: &str,
        target_user_id: Uuid,
        reason: &str,
    ) -> Result<StartImpersonationOutput, AuthError> {
        let phase = self.store.snapshot().phase;
        if phase != Phase::Idle {
            return Err(AuthError::StartInProgress);
        }
        self.store.transition(Phase::Starting)?;

        let result = self
            .start_action
            .execute(StartImpersonationInput {
                access_token: access_token.to_owned(),
                target_user_id,
                reason: reason.to_owned(),
            })
            .await;

        let output = match result {
            Ok(output) => output,
            Err(err) => {
                // rollback; losers of a cross-tab race will instead
                // observe the winner's broadcast
                let _ = self.store.transition(Phase::Idle);
                return Err(err);
            }
        };

        let marker = ImpersonationMarker {
            session_id: output.session_id,
            admin_user_id: output.custody.admin_user_id,
            target: output.target_user.clone(),
            expires_at: Some(output.expires_at),
        };

        // team context re-resolves for the target; the snapshot lands whole
        self.store.update(|s| {
            s.phase = Phase::Active;
            s.user = Some(output.target_user.clone());
            s.team_id = None;
            s.role = None;
            s.impersonation = Some(marker.clone());
        });

        self.persist_pointer(&marker).await;
        self.broadcast(SyncEventKind::ImpersonationStarted);

        Ok(output)
    }

    /// Stops the active impersonation.
    ///
    /// Local state resets no matter what the server says: a partially
    /// failed cleanup trades a possibly-stale audit row for never leaving
    /// the tab stuck mid-impersonation. Returns the admin's fresh session
    /// pair, or `Ok(None)` when another tab already stopped it.
    pub async fn stop(&self, access_token: &str) -> Result<Option<TokenPair>, AuthError> {
        let snapshot = self.store.snapshot();
        let marker = snapshot.impersonation.clone().ok_or(AuthError::NotFound)?;

        self.store.transition(Phase::Stopping)?;

        let result = self
            .stop_action
            .execute(access_token, marker.session_id)
            .await;

        self.reset_to_admin(marker.admin_user_id).await;
        self.clear_pointer().await;
        self.broadcast(SyncEventKind::ImpersonationStopped);

        match result {
            Ok(output) => Ok(Some(output.session)),
            // already closed elsewhere: the stop is a no-op
            Err(AuthError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Advisory local expiry detection (`Active → ExpiredLocally`).
    /// The credential's own expiry, enforced upstream, is authoritative.
    pub fn detect_local_expiry(&self) -> bool {
        self.store.note_expiry_if_due()
    }

    /// Health issues in the current snapshot.
    pub fn health_issues(&self) -> Vec<HealthIssue> {
        check_session(&self.store.snapshot(), Utc::now())
    }

    /// Runs the health check and recovers from impersonation issues by
    /// clearing the flag and, when this tab is the elected primary,
    /// broadcasting a known-good snapshot for the others to adopt.
    pub async fn recover_if_unhealthy(
        &self,
        registry: &TabRegistry,
    ) -> Result<Vec<HealthIssue>, AuthError> {
        let issues = self.health_issues();
        if issues.is_empty() {
            return Ok(issues);
        }

        log::warn!(
            target: "warrant",
            "msg=\"session health check failed\", tab_id={}, issues={issues:?}",
            self.store.tab_id()
        );

        let impersonation_broken = issues.iter().any(|i| {
            matches!(
                i,
                HealthIssue::ImpersonationExpired | HealthIssue::ImpersonationWithoutExpiry
            )
        });

        if impersonation_broken {
            let marker = self.store.snapshot().impersonation.clone();
            self.detect_local_expiry();

            // known-good snapshot: flag cleared, nothing half-set
            self.store.update(|s| {
                s.impersonation = None;
                s.phase = Phase::Idle;
                s.user = None;
                s.team_id = None;
                s.role = None;
            });
            self.clear_pointer().await;

            if let Some(marker) = marker {
                dispatch(AuthEvent::ImpersonationExpired {
                    session_id: marker.session_id,
                    admin_user_id: marker.admin_user_id,
                    at: Utc::now(),
                })
                .await;
            }

            // only the elected primary broadcasts, so N tabs detecting
            // the same expiry produce one recovery, not N
            if registry.is_primary(self.store.tab_id())? {
                self.broadcast(SyncEventKind::Recovery);
            }

            dispatch(AuthEvent::SessionRecovered {
                tab_id: self.store.tab_id(),
                at: Utc::now(),
            })
            .await;
        } else if issues.contains(&HealthIssue::RoleWithoutTeam) {
            self.store.update(|s| s.role = None);
        }

        Ok(issues)
    }

    /// Adopts state broadcast by another tab.
    pub async fn apply_envelope(&self, envelope: SyncEnvelope) {
        let mut state = envelope.state;
        state.tab_id = self.store.tab_id();

        // the pointer follows the marker so a reload in this tab
        // reconstructs the same view
        match &state.impersonation {
            Some(marker) => {
                let pointer = ImpersonationPointer {
                    session_id: marker.session_id,
                    admin_user_id: marker.admin_user_id,
                    target_user_id: marker.target.id,
                    expires_at: marker.expires_at,
                };
                if let Err(err) = self.pointer_store.save(&pointer).await {
                    log::warn!(
                        target: "warrant",
                        "msg=\"failed to persist pointer from envelope\", error=\"{err:?}\""
                    );
                }
            }
            None => self.clear_pointer().await,
        }

        self.store.replace(state);
    }

    async fn reset_to_admin(&self, admin_user_id: Uuid) {
        // best effort: the admin summary makes the idle snapshot nicer,
        // but reset must not depend on the platform answering
        let admin = self.provider.find_user(admin_user_id).await.ok().flatten();

        let mut next = SessionSnapshot::empty(self.store.tab_id());
        next.user = admin;
        self.store.replace(next);
    }

    async fn persist_pointer(&self, marker: &ImpersonationMarker) {
        let pointer = ImpersonationPointer {
            session_id: marker.session_id,
            admin_user_id: marker.admin_user_id,
            target_user_id: marker.target.id,
            expires_at: marker.expires_at,
        };
        if let Err(err) = self.pointer_store.save(&pointer).await {
            log::warn!(
                target: "warrant",
                "msg=\"failed to persist impersonation pointer\", error=\"{err:?}\""
            );
        }
    }

    async fn clear_pointer(&self) {
        if let Err(err) = self.pointer_store.clear().await {
            log::warn!(
                target: "warrant",
                "msg=\"failed to clear impersonation pointer\", error=\"{err:?}\""
            );
        }
    }

    fn broadcast(&self, event: SyncEventKind) {
        if let Err(err) = self
            .bus
            .publish(event, self.store.snapshot(), self.store.tab_id())
        {
            log::warn!(
                target: "warrant",
                "msg=\"failed to broadcast sync envelope\", event={event:?}, error=\"{err:?}\""
            );
        }
    }
}

#[cfg(all(test, feature = "mocks"))]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::identity::InMemoryIdentityPlatform;
    use crate::impersonation::{
        MockImpersonationLockRepository, MockImpersonationSessionRepository,
    };
    use crate::roles::Role;
    use crate::session::InMemoryPointerStore;
    use crate::SecretString;

    type TestOrchestrator = Orchestrator<
        Arc<InMemoryIdentityPlatform>,
        Arc<MockImpersonationSessionRepository>,
        Arc<MockImpersonationLockRepository>,
        Arc<InMemoryPointerStore>,
    >;

    struct Fixture {
        platform: Arc<InMemoryIdentityPlatform>,
        sessions: Arc<MockImpersonationSessionRepository>,
        locks: Arc<MockImpersonationLockRepository>,
        bus: SyncBus,
        admin_token: String,
        target_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let platform =
            Arc::new(InMemoryIdentityPlatform::new("test-secret-32-bytes-long-key-01").unwrap());
        platform
            .register_user(
                "root@example.com",
                "Root",
                "hunter2hunter2",
                Some(Role::SuperAdmin),
                true,
            )
            .unwrap();
        let target = platform
            .register_user("u@example.com", "User", "hunter2hunter2", None, false)
            .unwrap();

        let (pair, _) = platform
            .sign_in_with_password("root@example.com", &SecretString::new("hunter2hunter2"))
            .await
            .unwrap();

        Fixture {
            platform,
            sessions: Arc::new(MockImpersonationSessionRepository::new()),
            locks: Arc::new(MockImpersonationLockRepository::new()),
            bus: SyncBus::new(),
            admin_token: pair.access_token,
            target_id: target.id,
        }
    }

    fn orchestrator(f: &Fixture, tab_id: Uuid) -> TestOrchestrator {
        Orchestrator::new(
            f.platform.clone(),
            f.sessions.clone(),
            f.locks.clone(),
            Arc::new(SessionStore::new(tab_id)),
            f.bus.clone(),
            Arc::new(InMemoryPointerStore::new()),
            SyncConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_start_activates_and_broadcasts() {
        let f = fixture().await;
        let tab_a = Uuid::new_v4();
        let tab_b = Uuid::new_v4();

        let orch_a = orchestrator(&f, tab_a);
        let orch_b = orchestrator(&f, tab_b);
        let mut sub_b = orch_b.subscribe();

        orch_a
            .start(&f.admin_token, f.target_id, "ticket #1")
            .await
            .unwrap();

        let snapshot = orch_a.store().snapshot();
        assert_eq!(snapshot.phase, Phase::Active);
        assert!(snapshot.is_impersonating());
        assert_eq!(snapshot.user.as_ref().unwrap().id, f.target_id);

        // tab B sees the broadcast and adopts it
        let envelope = sub_b.recv().await.unwrap();
        assert_eq!(envelope.event, SyncEventKind::ImpersonationStarted);
        orch_b.apply_envelope(envelope).await;

        let b_snapshot = orch_b.store().snapshot();
        assert!(b_snapshot.is_impersonating());
        assert_eq!(b_snapshot.tab_id, tab_b);
    }

    #[tokio::test]
    async fn test_start_rolls_back_on_failure() {
        let f = fixture().await;
        let orch = orchestrator(&f, Uuid::new_v4());

        // self-impersonation fails inside the action
        let admin = f
            .platform
            .introspect(&f.admin_token)
            .await
            .unwrap()
            .user
            .id;
        let err = orch.start(&f.admin_token, admin, "self").await.unwrap_err();
        assert_eq!(err, AuthError::SelfImpersonation);

        assert_eq!(orch.store().snapshot().phase, Phase::Idle);
        assert!(f.sessions.all().is_empty());
    }

    #[tokio::test]
    async fn test_start_while_active_conflicts() {
        let f = fixture().await;
        let orch = orchestrator(&f, Uuid::new_v4());

        orch.start(&f.admin_token, f.target_id, "ticket #1")
            .await
            .unwrap();

        let err = orch
            .start(&f.admin_token, f.target_id, "ticket #2")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::StartInProgress);
    }

    #[tokio::test]
    async fn test_stop_resets_and_returns_fresh_pair() {
        let f = fixture().await;
        let orch = orchestrator(&f, Uuid::new_v4());

        let output = orch
            .start(&f.admin_token, f.target_id, "ticket #1")
            .await
            .unwrap();

        let pair = orch
            .stop(&output.session.access_token)
            .await
            .unwrap()
            .expect("fresh pair");

        let snapshot = orch.store().snapshot();
        assert_eq!(snapshot.phase, Phase::Idle);
        assert!(!snapshot.is_impersonating());

        // restored session is the admin's own
        let restored = f.platform.introspect(&pair.access_token).await.unwrap();
        assert!(!restored.is_impersonating());

        // audit row closed exactly once
        let rows = f.sessions.all();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].ended_at.is_some());
    }

    #[tokio::test]
    async fn test_stop_without_active_session() {
        let f = fixture().await;
        let orch = orchestrator(&f, Uuid::new_v4());

        assert_eq!(
            orch.stop(&f.admin_token).await.unwrap_err(),
            AuthError::NotFound
        );
    }

    #[tokio::test]
    async fn test_expiry_recovery_clears_flag_and_broadcasts() {
        let f = fixture().await;
        let tab_a = Uuid::new_v4();
        let tab_b = Uuid::new_v4();

        let orch_a = orchestrator(&f, tab_a);
        let orch_b = orchestrator(&f, tab_b);
        let mut sub_b = orch_b.subscribe();

        // only tab A is registered, so it is the elected primary and
        // owns the recovery broadcast
        let registry = TabRegistry::new(Duration::minutes(5));
        registry.register(tab_a, "/admin").unwrap();

        let output = orch_a
            .start(&f.admin_token, f.target_id, "ticket #1")
            .await
            .unwrap();
        // drain the start broadcast
        sub_b.recv().await.unwrap();

        // force the recorded expiry into the past
        orch_a.store().update(|s| {
            if let Some(marker) = &mut s.impersonation {
                marker.expires_at = Some(Utc::now() - Duration::seconds(1));
            }
        });

        let issues = orch_a.recover_if_unhealthy(&registry).await.unwrap();
        assert!(issues.contains(&HealthIssue::ImpersonationExpired));

        // flag cleared locally
        assert!(!orch_a.store().snapshot().is_impersonating());

        // and everywhere: tab B adopts the recovery snapshot
        let envelope = sub_b.recv().await.unwrap();
        assert_eq!(envelope.event, SyncEventKind::Recovery);
        orch_b.apply_envelope(envelope).await;
        assert!(!orch_b.store().snapshot().is_impersonating());

        // the audit row remains open until the sweep; the scoped
        // credential itself has expired upstream
        let row = f
            .sessions
            .find_by_id(output.session_id)
            .await
            .unwrap()
            .unwrap();
        assert!(row.is_active());
    }

    #[tokio::test]
    async fn test_healthy_session_no_recovery() {
        let f = fixture().await;
        let orch = orchestrator(&f, Uuid::new_v4());
        let registry = TabRegistry::new(Duration::minutes(5));

        let issues = orch.recover_if_unhealthy(&registry).await.unwrap();
        assert!(issues.is_empty());
    }
}
