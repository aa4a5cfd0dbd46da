use chrono::Utc;

use super::repository::ImpersonationSessionRepository;
use super::impersonation_ttl;
use crate::events::{dispatch, AuthEvent};
use crate::AuthError;

/// Operational sweep closing audit rows left open past their expiry.
///
/// A crashed client or an expired tab never calls stop; this runs
/// periodically (operator's schedule) and force-ends those rows with
/// `ended_at` set to their expiry time.
pub struct SweepExpiredSessionsAction<R: ImpersonationSessionRepository> {
    sessions: R,
}

impl<R: ImpersonationSessionRepository> SweepExpiredSessionsAction<R> {
    pub fn new(sessions: R) -> Self {
        Self { sessions }
    }

    /// Closes all open rows past expiry. Returns how many were closed.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "sweep_expired_impersonations", skip_all, err)
    )]
    pub async fn execute(&self) -> Result<u64, AuthError> {
        let cutoff = Utc::now() - impersonation_ttl();
        let expired = self.sessions.find_open_started_before(cutoff).await?;

        let mut closed = 0u64;
        for row in expired {
            match self.sessions.close(row.id, row.expires_at()).await {
                Ok(_) => {
                    closed += 1;
                    dispatch(AuthEvent::ImpersonationExpired {
                        session_id: row.id,
                        admin_user_id: row.admin_user_id,
                        at: Utc::now(),
                    })
                    .await;
                }
                // a concurrent stop got there first; nothing to do
                Err(AuthError::NotFound) => {}
                Err(err) => return Err(err),
            }
        }

        if closed > 0 {
            log::info!(
                target: "warrant",
                "msg=\"swept expired impersonation sessions\", closed={closed}"
            );
        }

        Ok(closed)
    }
}
