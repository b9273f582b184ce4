//! Capabilities the leadership controller needs from a coordination service.

use async_trait::async_trait;
use common::Result;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Entry point to a coordination service.
#[async_trait]
pub trait Coordinator: Send + Sync {
    type Session: Session;
    type Election: Election;

    /// Create a lease with the given TTL, kept alive in the background.
    async fn new_session(&self, ttl: Duration) -> Result<Self::Session>;

    /// Create an election on `contest` owned by `session`.
    fn new_election(&self, session: &Self::Session, contest: &str) -> Self::Election;
}

/// A renewable lease.
#[async_trait]
pub trait Session: Send + Sync {
    /// Cancelled once, when the lease can no longer be kept alive.
    fn lost(&self) -> CancellationToken;

    /// Stop renewing and release the lease.
    async fn close(self) -> Result<()>;
}

/// Participation in one named election under one session.
#[async_trait]
pub trait Election: Send {
    /// Suspend until this participant leads the contest.
    ///
    /// Dropping the returned future abandons the campaign.
    async fn campaign(&mut self, value: &str) -> Result<()>;

    /// Give up leadership. A no-op when the campaign was never won.
    async fn resign(&mut self) -> Result<()>;
}
