//! Token custody and the restoration protocol.
//!
//! While an impersonation is active, the only thing retained about the
//! admin's own session is their identifier. The admin's refresh secret is
//! not obtainable from a bearer header and is deliberately never captured,
//! so script-injection on the client has nothing durable to exfiltrate.
//!
//! Returning to the admin identity therefore cannot resurrect a stored
//! secret. Instead the platform issues a single-use login artifact for the
//! admin and redeems it immediately, producing a freshly minted session
//! pair. Restoration is session regeneration, not secret retrieval: the
//! admin's token pair rotates on every impersonation stop, which is fine
//! because the underlying identity is unchanged.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::identity::IdentityProvider;
use crate::token::TokenPair;
use crate::AuthError;

/// Ephemeral record of where the restoration secret lives: nowhere.
///
/// Holds the admin's identifier only. There is intentionally no field
/// that could carry a reusable secret.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenCustodyRecord {
    pub admin_user_id: Uuid,
    pub captured_at: DateTime<Utc>,
}

impl TokenCustodyRecord {
    /// Captures custody for an admin at the start of an impersonation.
    pub fn capture(admin_user_id: Uuid) -> Self {
        Self {
            admin_user_id,
            captured_at: Utc::now(),
        }
    }
}

/// Regenerates the admin's session on impersonation stop.
pub struct RestorationProtocol<P: IdentityProvider> {
    provider: P,
}

impl<P: IdentityProvider> RestorationProtocol<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Issues a single-use login artifact for the admin and redeems it
    /// immediately, returning a fresh token pair.
    ///
    /// Fails closed: any platform failure surfaces as
    /// [`AuthError::Upstream`]. Callers must have already closed the
    /// audit row; audit closure never depends on this succeeding.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "restore_admin_session", skip_all, err)
    )]
    pub async fn restore(&self, record: &TokenCustodyRecord) -> Result<TokenPair, AuthError> {
        let artifact = self
            .provider
            .issue_login_artifact(record.admin_user_id)
            .await
            .map_err(|e| upstream("artifact issuance", e))?;

        let pair = self
            .provider
            .redeem_login_artifact(&artifact)
            .await
            .map_err(|e| upstream("artifact redemption", e))?;

        log::info!(
            target: "warrant",
            "msg=\"admin session regenerated\", admin_user_id={}",
            record.admin_user_id
        );

        Ok(pair)
    }
}

fn upstream(stage: &str, err: AuthError) -> AuthError {
    log::error!(
        target: "warrant",
        "msg=\"restoration failed\", stage=\"{stage}\", error=\"{err:?}\""
    );
    match err {
        AuthError::Upstream(_) => err,
        other => AuthError::Upstream(format!("{stage} failed: {other:?}")),
    }
}
