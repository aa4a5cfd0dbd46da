//! Event system for authentication and impersonation actions.
//!
//! Events are fired from actions and the orchestrator. If no listeners
//! are registered, they are silently ignored (zero overhead).
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use warrant::register_event_listeners;
//! use warrant::events::listeners::LoggingListener;
//!
//! fn main() {
//!     // register listeners at startup
//!     register_event_listeners(|registry| {
//!         registry.listen(LoggingListener::new());
//!     });
//! }
//! ```
//!
//! # Custom Listeners
//!
//! Implement the [`Listener`] trait to create custom event handlers:
//!
//! ```rust,ignore
//! use warrant::events::{AuthEvent, Listener};
//! use async_trait::async_trait;
//!
//! struct AlertListener;
//!
//! #[async_trait]
//! impl Listener for AlertListener {
//!     async fn handle(&self, event: &AuthEvent) {
//!         if let AuthEvent::ImpersonationStarted { admin_user_id, .. } = event {
//!             // page the on-call channel
//!         }
//!     }
//! }
//! ```

mod event;
mod listener;
mod registry;

pub mod listeners;

pub use event::AuthEvent;
pub use listener::Listener;
pub use registry::{dispatch, register_event_listeners};
