//! Cross-tab session synchronizer.
//!
//! Keeps every tab of one browser profile eventually consistent on
//! {team, role, impersonation status} without a server round-trip per
//! tab. The browser's shared storage channel becomes an explicit pub/sub
//! bus scoped per user session; the envelope contract is preserved:
//! JSON envelopes `{event, state, timestamp, source_tab}`, a staleness
//! filter, and same-tab exclusion.
//!
//! Ordering is best-effort wall-clock, not consensus. The acceptable
//! failure mode is a few seconds of visible staleness in a non-primary
//! tab, never a security breach, because the upstream credential's own
//! expiry is the real enforcement boundary. A writer must not assume
//! read-after-write consistency outside its own tab.

mod registry;

pub use registry::{TabRegistration, TabRegistry};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::session::SessionSnapshot;
use crate::AuthError;

/// Default bus capacity; late receivers past this lag drop old envelopes.
const DEFAULT_CAPACITY: usize = 64;

/// What a broadcast envelope announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventKind {
    StateChanged,
    ImpersonationStarted,
    ImpersonationStopped,
    SignedOut,
    /// A known-good snapshot broadcast after a health-check failure;
    /// receiving tabs adopt it.
    Recovery,
}

/// The wire envelope carried on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEnvelope {
    pub event: SyncEventKind,
    pub state: SessionSnapshot,
    pub timestamp: DateTime<Utc>,
    pub source_tab: Uuid,
}

/// Shared envelope bus for all tabs of one user session.
///
/// Envelopes travel as serialized JSON, mirroring the storage-channel
/// contract this replaces.
#[derive(Clone)]
pub struct SyncBus {
    tx: broadcast::Sender<String>,
}

impl SyncBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an envelope, stamping the timestamp and source tab.
    pub fn publish(
        &self,
        event: SyncEventKind,
        state: SessionSnapshot,
        source_tab: Uuid,
    ) -> Result<(), AuthError> {
        self.publish_envelope(&SyncEnvelope {
            event,
            state,
            timestamp: Utc::now(),
            source_tab,
        })
    }

    /// Publishes a pre-built envelope verbatim, timestamp included.
    pub fn publish_envelope(&self, envelope: &SyncEnvelope) -> Result<(), AuthError> {
        let json = serde_json::to_string(envelope)
            .map_err(|e| AuthError::Internal(format!("envelope serialization: {e}")))?;

        // No subscribers is not an error: a single open tab broadcasts
        // into the void.
        let _ = self.tx.send(json);
        Ok(())
    }

    /// Subscribes a tab to the bus with its filters applied.
    pub fn subscribe(&self, tab_id: Uuid, staleness_window: Duration) -> SyncSubscriber {
        SyncSubscriber {
            rx: self.tx.subscribe(),
            tab_id,
            staleness_window,
        }
    }
}

impl Default for SyncBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A tab's filtered view of the bus.
///
/// Discards envelopes the tab produced itself and envelopes older than
/// the staleness window; everything else is applied optimistically by
/// the caller.
pub struct SyncSubscriber {
    rx: broadcast::Receiver<String>,
    tab_id: Uuid,
    staleness_window: Duration,
}

impl SyncSubscriber {
    /// Waits for the next envelope that passes the filters.
    ///
    /// Returns `None` once the bus is closed.
    pub async fn recv(&mut self) -> Option<SyncEnvelope> {
        loop {
            match self.rx.recv().await {
                Ok(json) => {
                    if let Some(envelope) = self.accept(&json) {
                        return Some(envelope);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::debug!(
                        target: "warrant",
                        "msg=\"sync subscriber lagged\", tab_id={}, skipped={skipped}",
                        self.tab_id
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant; `None` when nothing acceptable is queued.
    pub fn try_recv(&mut self) -> Option<SyncEnvelope> {
        loop {
            match self.rx.try_recv() {
                Ok(json) => {
                    if let Some(envelope) = self.accept(&json) {
                        return Some(envelope);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return None,
            }
        }
    }

    fn accept(&self, json: &str) -> Option<SyncEnvelope> {
        let envelope: SyncEnvelope = match serde_json::from_str(json) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::warn!(
                    target: "warrant",
                    "msg=\"discarding malformed sync envelope\", error=\"{e}\""
                );
                return None;
            }
        };

        // same-tab exclusion: a tab never applies its own echo
        if envelope.source_tab == self.tab_id {
            return None;
        }

        // staleness filter: old envelopes are out-of-date echoes
        if Utc::now() - envelope.timestamp > self.staleness_window {
            log::debug!(
                target: "warrant",
                "msg=\"discarding stale sync envelope\", event={:?}, age_ms={}",
                envelope.event,
                (Utc::now() - envelope.timestamp).num_milliseconds()
            );
            return None;
        }

        Some(envelope)
    }
}
