//! Configuration for the warrant library.
//!
//! Centralizes the tunable durations: invitation expiry, the cross-tab
//! staleness window, tab registry retention, and the bounded poll used at
//! session initialization.
//!
//! The 30-minute impersonation expiry is deliberately *not* here; it is
//! an absolute bound, see [`crate::impersonation::IMPERSONATION_TTL_MINUTES`].

use chrono::Duration;

/// Main configuration struct.
///
/// Use `WarrantConfig::default()` for production defaults.
#[derive(Debug, Clone)]
pub struct WarrantConfig {
    /// Invitation lifecycle settings.
    pub invitations: InvitationConfig,

    /// Cross-tab synchronizer settings.
    pub sync: SyncConfig,

    /// Bounded poll used while waiting for the identity platform at
    /// session initialization.
    pub init_poll: PollConfig,

    /// Length of generated opaque tokens (in characters).
    ///
    /// Default is 32 alphanumeric characters (~190 bits of entropy).
    pub token_length: usize,
}

impl Default for WarrantConfig {
    fn default() -> Self {
        Self {
            invitations: InvitationConfig::default(),
            sync: SyncConfig::default(),
            init_poll: PollConfig::default(),
            token_length: 32,
        }
    }
}

impl WarrantConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stricter settings: shorter invitations, a tighter staleness
    /// window, and longer tokens.
    pub fn strict() -> Self {
        Self {
            invitations: InvitationConfig { expiry_days: 3 },
            sync: SyncConfig {
                staleness_window: Duration::seconds(2),
                tab_ttl: Duration::minutes(2),
            },
            init_poll: PollConfig::default(),
            token_length: 48,
        }
    }
}

/// Configuration for team invitations.
#[derive(Debug, Clone)]
pub struct InvitationConfig {
    /// Number of days until an invitation expires. Default: 7
    pub expiry_days: i64,
}

impl Default for InvitationConfig {
    fn default() -> Self {
        Self { expiry_days: 7 }
    }
}

/// Configuration for the cross-tab synchronizer.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Envelopes older than this are discarded as stale echoes.
    ///
    /// Default: 5 seconds
    pub staleness_window: Duration,

    /// Tab registrations unseen for longer than this are pruned.
    ///
    /// Default: 5 minutes
    pub tab_ttl: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            staleness_window: Duration::seconds(5),
            tab_ttl: Duration::minutes(5),
        }
    }
}

/// Bounded poll: fixed attempts at a fixed delay, then give up.
///
/// Session initialization uses this instead of blocking indefinitely so
/// the surface degrades gracefully when the identity platform is slow.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Maximum number of attempts. Default: 10
    pub attempts: u32,

    /// Delay between attempts in milliseconds. Default: 200
    pub delay_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay_ms: 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WarrantConfig::default();

        assert_eq!(config.invitations.expiry_days, 7);
        assert_eq!(config.sync.staleness_window, Duration::seconds(5));
        assert_eq!(config.sync.tab_ttl, Duration::minutes(5));
        assert_eq!(config.init_poll.attempts, 10);
        assert_eq!(config.init_poll.delay_ms, 200);
        assert_eq!(config.token_length, 32);
    }

    #[test]
    fn test_strict_config() {
        let config = WarrantConfig::strict();

        assert_eq!(config.invitations.expiry_days, 3);
        assert_eq!(config.sync.staleness_window, Duration::seconds(2));
        assert_eq!(config.token_length, 48);
    }
}
