use async_trait::async_trait;

use crate::events::{AuthEvent, Listener};

/// Logs all events using the `log` crate.
///
/// # Example
///
/// ```rust,ignore
/// use warrant::register_event_listeners;
/// use warrant::events::listeners::LoggingListener;
///
/// register_event_listeners(|registry| {
///     registry.listen(LoggingListener::new());
/// });
/// ```
pub struct LoggingListener {
    level: log::Level,
}

impl LoggingListener {
    /// Creates a new logging listener at INFO level.
    pub fn new() -> Self {
        Self {
            level: log::Level::Info,
        }
    }

    /// Creates a new logging listener at the specified level.
    pub fn with_level(level: log::Level) -> Self {
        Self { level }
    }
}

impl Default for LoggingListener {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Listener for LoggingListener {
    async fn handle(&self, event: &AuthEvent) {
        log::log!(
            target: "warrant::events",
            self.level,
            "event={} {:?}",
            event.name(),
            event
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_logging_listener_new() {
        let listener = LoggingListener::new();
        assert_eq!(listener.level, log::Level::Info);
    }

    #[test]
    fn test_logging_listener_with_level() {
        let listener = LoggingListener::with_level(log::Level::Debug);
        assert_eq!(listener.level, log::Level::Debug);
    }

    #[tokio::test]
    async fn test_logging_listener_handle() {
        let listener = LoggingListener::new();
        let event = AuthEvent::SignOut {
            user_id: Uuid::new_v4(),
            at: Utc::now(),
        };

        // should not panic
        listener.handle(&event).await;
    }
}
