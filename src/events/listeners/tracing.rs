use async_trait::async_trait;

use crate::events::{AuthEvent, Listener};

/// Emits events as tracing events.
///
/// Requires the `tracing` feature to be enabled.
pub struct TracingListener;

#[async_trait]
impl Listener for TracingListener {
    async fn handle(&self, event: &AuthEvent) {
        tracing::info!(
            target: "warrant::events",
            event_name = event.name(),
            ?event,
            "auth event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_tracing_listener_handle() {
        let listener = TracingListener;
        let event = AuthEvent::SignOut {
            user_id: Uuid::new_v4(),
            at: Utc::now(),
        };

        // should not panic
        listener.handle(&event).await;
    }
}
