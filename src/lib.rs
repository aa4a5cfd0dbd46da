//! Team-scoped authentication with audited super-admin impersonation.
//!
//! The crate is organized around a small set of seams:
//!
//! - [`roles`]: the permission matrix gating every mutating operation.
//! - [`identity`]: the boundary to the upstream identity platform.
//! - [`custody`]: token custody and the restoration protocol.
//! - [`session`]: the per-tab session state machine and health check.
//! - [`sync`]: the cross-tab synchronizer bus.
//! - [`impersonation`]: the start/stop orchestrator and its audit trail.
//! - [`teams`]: memberships and the invitation lifecycle.
//! - [`service`]: the client-exposed facade.
//!
//! Storage and credential minting live behind async traits; the `mocks`
//! feature provides in-memory implementations used by the test suite.

pub mod config;
pub mod crypto;
pub mod custody;
pub mod events;
pub mod identity;
pub mod impersonation;
pub mod roles;
pub mod service;
pub mod session;
pub mod sync;
pub mod teams;
pub mod token;
pub mod validators;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use crypto::SecretString;
pub use events::register_event_listeners;
pub use roles::Role;
pub use service::AuthService;

/// Errors produced by authentication, team, and impersonation operations.
///
/// Variants group into a fixed taxonomy via [`AuthError::code`]; the
/// taxonomy, not the variant, is what crosses the client boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthError {
    // validation
    Validation(String),
    InvalidEmail,
    SelfImpersonation,
    RoleNotAssignable,

    // authentication
    InvalidCredentials,
    TokenExpired,
    TokenInvalid,

    // authorization
    Forbidden,
    SecondaryVerificationRequired,
    EmailMismatch,

    // conflict
    AlreadyMember,
    DuplicateInvitation,
    InvitationAlreadyAccepted,
    InvitationRevoked,
    SoleOwner,
    StartInProgress,
    ActiveSessionExists,

    // not found
    NotFound,
    UserNotFound,

    // upstream identity platform
    Upstream(String),

    // client-only inconsistency
    LocalState(String),

    // internal
    ConfigurationError(String),
    Internal(String),
}

impl AuthError {
    /// Returns the taxonomy code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_)
            | Self::InvalidEmail
            | Self::SelfImpersonation
            | Self::RoleNotAssignable => "validation_error",
            Self::InvalidCredentials | Self::TokenExpired | Self::TokenInvalid => {
                "authentication_error"
            }
            Self::Forbidden | Self::SecondaryVerificationRequired | Self::EmailMismatch => {
                "authorization_error"
            }
            Self::AlreadyMember
            | Self::DuplicateInvitation
            | Self::InvitationAlreadyAccepted
            | Self::InvitationRevoked
            | Self::SoleOwner
            | Self::StartInProgress
            | Self::ActiveSessionExists => "conflict_error",
            Self::NotFound | Self::UserNotFound => "not_found",
            Self::Upstream(_) => "upstream_error",
            Self::LocalState(_) => "local_state_error",
            Self::ConfigurationError(_) | Self::Internal(_) => "internal_error",
        }
    }
}

impl std::error::Error for AuthError {}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Validation(msg) => write!(f, "{msg}"),
            AuthError::InvalidEmail => write!(f, "Invalid email format"),
            AuthError::SelfImpersonation => write!(f, "Cannot impersonate yourself"),
            AuthError::RoleNotAssignable => write!(f, "Role cannot be assigned to team members"),
            AuthError::InvalidCredentials => write!(f, "Invalid email or password"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::TokenInvalid => write!(f, "Invalid token"),
            AuthError::Forbidden => write!(f, "Insufficient permissions"),
            AuthError::SecondaryVerificationRequired => {
                write!(f, "Secondary verification is required")
            }
            AuthError::EmailMismatch => {
                write!(f, "This invitation was issued for a different email address")
            }
            AuthError::AlreadyMember => write!(f, "User is already a team member"),
            AuthError::DuplicateInvitation => {
                write!(f, "A pending invitation already exists for this email")
            }
            AuthError::InvitationAlreadyAccepted => write!(f, "Invitation was already accepted"),
            AuthError::InvitationRevoked => write!(f, "Invitation has been revoked"),
            AuthError::SoleOwner => write!(f, "Team must keep at least one owner"),
            AuthError::StartInProgress => {
                write!(f, "Another impersonation start is already in progress")
            }
            AuthError::ActiveSessionExists => {
                write!(f, "An impersonation session is already active")
            }
            AuthError::NotFound => write!(f, "Not found"),
            AuthError::UserNotFound => write!(f, "User not found"),
            AuthError::Upstream(_) => write!(f, "Identity platform request failed"),
            AuthError::LocalState(msg) => write!(f, "{msg}"),
            AuthError::ConfigurationError(msg) => write!(f, "Configuration error: {msg}"),
            AuthError::Internal(_) => write!(f, "Internal error"),
        }
    }
}

/// Wire shape for failures crossing the client boundary.
///
/// The message is the short human-readable rendering of the error; the
/// underlying detail stays in server logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AuthError> for ErrorResponse {
    fn from(err: AuthError) -> Self {
        Self {
            code: err.code().to_owned(),
            message: err.to_string(),
        }
    }
}
