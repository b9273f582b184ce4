//! Leadership lifecycle state machine.
//!
//! Transitions:
//! - Campaigning → Leading (campaign won, address bound)
//! - Leading → Campaigning (session lost, or bind failed)
//! - Leading → Releasing → Terminated (shutdown while leading)
//! - Campaigning → Terminated (shutdown before winning)
//! - Campaigning → Campaigning (session lost before binding; never binds)
//!
//! Leaving Leading always runs unbind, then resign, then session close.

use crate::backoff::Backoff;
use crate::types::{KeeperSettings, KeeperStats, LeadershipState};
use coordination::{Coordinator, Election, Session};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vipaddr::AddressBinder;

/// How one campaign attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TermOutcome {
    /// Shutdown was requested
    Shutdown,
    /// Session lost; campaign again right away
    LeaseLost,
    /// Transient failure; campaign again after backoff
    Retry,
}

/// How the campaign race ended.
enum CampaignOutcome {
    Shutdown,
    SessionLost,
    Done(common::Result<()>),
}

/// Keeps the virtual address on this host while it leads the election.
pub struct Keeper<C: Coordinator, B: AddressBinder> {
    settings: KeeperSettings,
    coordinator: C,
    binder: B,
    state: LeadershipState,
    stats: KeeperStats,
    backoff: Backoff,
}

impl<C: Coordinator, B: AddressBinder> Keeper<C, B> {
    /// Create a new controller
    pub fn new(settings: KeeperSettings, coordinator: C, binder: B) -> Self {
        let backoff = settings.backoff();
        Self {
            settings,
            coordinator,
            binder,
            state: LeadershipState::Campaigning,
            stats: KeeperStats::default(),
            backoff,
        }
    }

    /// Get current leadership state
    pub fn state(&self) -> LeadershipState {
        self.state
    }

    /// Get statistics
    pub fn stats(&self) -> &KeeperStats {
        &self.stats
    }

    /// Run until `shutdown` is cancelled and everything held is released.
    pub async fn run(&mut self, shutdown: CancellationToken) -> KeeperStats {
        info!(
            address = %self.settings.address,
            contest = %self.settings.contest,
            candidate = %self.settings.candidate,
            interval_ms = self.settings.interval.as_millis(),
            "Starting leadership controller"
        );

        loop {
            match self.run_term(&shutdown).await {
                TermOutcome::Shutdown => break,
                TermOutcome::LeaseLost => continue,
                TermOutcome::Retry => {
                    if !self.wait_backoff(&shutdown).await {
                        break;
                    }
                }
            }
        }

        self.transition_to(LeadershipState::Terminated);
        info!(stats = ?self.stats, "Leadership controller stopped");
        self.stats.clone()
    }

    /// One session: campaign, lead, and give everything back.
    async fn run_term(&mut self, shutdown: &CancellationToken) -> TermOutcome {
        self.transition_to(LeadershipState::Campaigning);
        self.stats.campaigns += 1;

        let ttl = self.settings.session_ttl();
        let session = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("Shutdown requested before a session was established");
                return TermOutcome::Shutdown;
            }
            result = self.coordinator.new_session(ttl) => result,
        };
        let session = match session {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, ttl_ms = ttl.as_millis(), "Creating session failed");
                self.stats.coordination_errors += 1;
                return TermOutcome::Retry;
            }
        };

        let lost = session.lost();
        let mut election = self
            .coordinator
            .new_election(&session, &self.settings.contest);

        debug!(contest = %self.settings.contest, "Campaigning for leadership");
        let campaign = tokio::select! {
            biased;
            _ = shutdown.cancelled() => CampaignOutcome::Shutdown,
            _ = lost.cancelled() => CampaignOutcome::SessionLost,
            result = election.campaign(&self.settings.candidate) => CampaignOutcome::Done(result),
        };
        match campaign {
            CampaignOutcome::Shutdown => {
                info!("Shutdown requested while campaigning, address was never bound");
                drop(election);
                self.close_session(session).await;
                return TermOutcome::Shutdown;
            }
            CampaignOutcome::SessionLost => {
                warn!(contest = %self.settings.contest, "Session lost while campaigning");
                self.stats.leases_lost += 1;
                return TermOutcome::LeaseLost;
            }
            CampaignOutcome::Done(Err(e)) => {
                warn!(error = %e, contest = %self.settings.contest, "Campaign failed");
                self.stats.coordination_errors += 1;
                drop(election);
                self.close_session(session).await;
                return TermOutcome::Retry;
            }
            CampaignOutcome::Done(Ok(())) => {}
        }

        // A win reported on a dead lease is not leadership.
        if lost.is_cancelled() {
            warn!(
                contest = %self.settings.contest,
                "Campaign returned after the session was lost, not binding"
            );
            self.stats.leases_lost += 1;
            return TermOutcome::LeaseLost;
        }

        self.stats.terms_won += 1;
        self.transition_to(LeadershipState::Leading);

        if let Err(e) = self.binder.bind(&self.settings.address).await {
            warn!(
                action = "add",
                address = %self.settings.address,
                error = %e,
                "Binding address failed, giving up leadership"
            );
            self.stats.bind_failures += 1;
            self.release(election, session).await;
            return TermOutcome::Retry;
        }
        info!(address = %self.settings.address, "Address bound, leading");
        self.backoff.reset();

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("Shutdown requested while leading");
                self.transition_to(LeadershipState::Releasing);
                self.release(election, session).await;
                TermOutcome::Shutdown
            }
            _ = lost.cancelled() => {
                warn!(address = %self.settings.address, "Session lost while leading");
                self.stats.leases_lost += 1;
                self.unbind().await;
                // The lease is gone server side; resigning would only fail.
                drop(election);
                drop(session);
                TermOutcome::LeaseLost
            }
        }
    }

    /// Unbind, resign, close; each step runs whatever the previous one did.
    async fn release(&mut self, mut election: C::Election, session: C::Session) {
        self.unbind().await;

        let limit = self.settings.release_timeout();
        match timeout(limit, election.resign()).await {
            Ok(Ok(())) => info!(contest = %self.settings.contest, "Resigned leadership"),
            Ok(Err(e)) => {
                warn!(error = %e, contest = %self.settings.contest, "Resigning leadership failed");
                self.stats.resign_failures += 1;
            }
            Err(_) => {
                warn!(
                    timeout_ms = limit.as_millis(),
                    contest = %self.settings.contest,
                    "Resigning leadership timed out"
                );
                self.stats.resign_failures += 1;
            }
        }
        drop(election);

        self.close_session(session).await;
    }

    async fn close_session(&mut self, session: C::Session) {
        let limit = self.settings.release_timeout();
        match timeout(limit, session.close()).await {
            Ok(Ok(())) => debug!("Session closed"),
            Ok(Err(e)) => {
                warn!(error = %e, "Closing session failed, lease will expire on its own");
                self.stats.close_failures += 1;
            }
            Err(_) => {
                warn!(
                    timeout_ms = limit.as_millis(),
                    "Closing session timed out, lease will expire on its own"
                );
                self.stats.close_failures += 1;
            }
        }
    }

    /// Remove the address regardless of what we believe is bound.
    async fn unbind(&mut self) {
        match self.binder.unbind(&self.settings.address).await {
            Ok(()) => info!(address = %self.settings.address, "Address released"),
            Err(e) => {
                error!(
                    action = "delete",
                    address = %self.settings.address,
                    error = %e,
                    "Releasing address failed, it may still be bound on this host"
                );
                self.stats.unbind_failures += 1;
            }
        }
    }

    /// Sleep for the next backoff delay. Returns false if shutdown came first.
    async fn wait_backoff(&mut self, shutdown: &CancellationToken) -> bool {
        let delay = self.backoff.next_delay();
        info!(delay_ms = delay.as_millis(), "Campaigning again after backoff");

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => false,
            _ = sleep(delay) => true,
        }
    }

    fn transition_to(&mut self, next: LeadershipState) {
        if self.state == next {
            return;
        }

        info!(
            from = %self.state,
            to = %next,
            address = %self.settings.address,
            "Leadership state transition"
        );
        self.state = next;
    }
}
