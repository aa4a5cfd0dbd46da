use async_trait::async_trait;

use super::AuthEvent;

/// Trait for handling events asynchronously.
///
/// Implement this trait to create custom event listeners. Listeners can
/// perform any async operation: logging, notifications, metrics.
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// Handle an event.
    ///
    /// Called for every event dispatched. Filter by matching on the
    /// event variant to handle specific events.
    async fn handle(&self, event: &AuthEvent);
}
