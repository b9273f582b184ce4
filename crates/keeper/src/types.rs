//! Leadership controller data types.

use std::time::Duration;
use vipaddr::VirtualAddress;

/// Session TTL as a multiple of the interval.
pub const SESSION_TTL_FACTOR: u32 = 15;

/// Bound on resign and session close, as a multiple of the interval.
pub const RELEASE_TIMEOUT_FACTOR: u32 = 5;

/// Longest retry delay, as a multiple of the interval.
pub const MAX_BACKOFF_FACTOR: u32 = 30;

/// Leadership state of this host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadershipState {
    /// Contending for leadership, address not bound
    Campaigning,
    /// Elected, address bound (or being bound)
    Leading,
    /// Shutting down while leading: unbinding and resigning
    Releasing,
    /// Control loop finished
    Terminated,
}

impl std::fmt::Display for LeadershipState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeadershipState::Campaigning => write!(f, "CAMPAIGNING"),
            LeadershipState::Leading => write!(f, "LEADING"),
            LeadershipState::Releasing => write!(f, "RELEASING"),
            LeadershipState::Terminated => write!(f, "TERMINATED"),
        }
    }
}

/// Controller settings
#[derive(Debug, Clone)]
pub struct KeeperSettings {
    /// Address kept on the leader
    pub address: VirtualAddress,

    /// Election key shared by all candidate hosts
    pub contest: String,

    /// Value published while campaigning, identifies this host
    pub candidate: String,

    /// Base interval all timings derive from
    pub interval: Duration,
}

impl KeeperSettings {
    /// Validate settings
    pub fn validate(&self) -> Result<(), String> {
        if self.interval.is_zero() {
            return Err("Interval must be greater than zero".to_string());
        }

        if self.contest.is_empty() {
            return Err("Election key is required".to_string());
        }

        if self.candidate.is_empty() {
            return Err("Candidate name is required".to_string());
        }

        Ok(())
    }

    /// Lease TTL; tolerates many missed renewals before leadership is lost.
    pub fn session_ttl(&self) -> Duration {
        self.interval * SESSION_TTL_FACTOR
    }

    /// Bound applied to each of resign and session close.
    pub fn release_timeout(&self) -> Duration {
        self.interval * RELEASE_TIMEOUT_FACTOR
    }

    /// Retry backoff starting at one interval.
    pub fn backoff(&self) -> crate::Backoff {
        crate::Backoff::new(self.interval, self.interval * MAX_BACKOFF_FACTOR)
    }
}

/// Controller statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeeperStats {
    /// Campaign attempts started
    pub campaigns: u64,

    /// Campaigns won
    pub terms_won: u64,

    /// Sessions lost while campaigning or leading
    pub leases_lost: u64,

    /// Failed session creations and campaigns
    pub coordination_errors: u64,

    /// Failed binds after winning
    pub bind_failures: u64,

    /// Failed unbinds
    pub unbind_failures: u64,

    /// Failed or timed out resignations
    pub resign_failures: u64,

    /// Failed or timed out session closes
    pub close_failures: u64,
}
