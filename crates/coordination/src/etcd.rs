//! etcd v3 implementation of the coordination capabilities.
//!
//! Sessions are leases renewed by a background task; elections use the etcd
//! election service with the session's lease attached to the candidate key.

use crate::coordinator::{Coordinator, Election, Session};
use async_trait::async_trait;
use common::{Error, Result};
use etcd_client::{
    Client, ConnectOptions, LeaderKey, LeaseKeepAliveStream, LeaseKeeper, ResignOptions,
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Shortest renewal period, whatever the TTL.
const MIN_RENEW_PERIOD: Duration = Duration::from_millis(500);

/// Credentials for etcd authentication.
#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connection settings for [`EtcdCoordinator`].
#[derive(Debug, Clone)]
pub struct EtcdOptions {
    pub endpoints: Vec<String>,
    pub credentials: Option<Credentials>,
    pub connect_timeout: Duration,
    /// Per-request deadline. Leave unset when campaigns must block until won.
    pub request_timeout: Option<Duration>,
}

/// Coordinator backed by an etcd cluster.
#[derive(Clone)]
pub struct EtcdCoordinator {
    client: Client,
}

impl EtcdCoordinator {
    /// Connect to the cluster.
    pub async fn connect(options: &EtcdOptions) -> Result<Self> {
        info!(endpoints = ?options.endpoints, "Connecting to etcd");

        let mut connect = ConnectOptions::new().with_connect_timeout(options.connect_timeout);
        if let Some(request_timeout) = options.request_timeout {
            connect = connect.with_timeout(request_timeout);
        }
        if let Some(creds) = &options.credentials {
            connect = connect.with_user(creds.user.clone(), creds.password.clone());
        }

        let client = Client::connect(&options.endpoints, Some(connect))
            .await
            .map_err(|e| Error::coordination(format!("connecting to etcd failed: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Coordinator for EtcdCoordinator {
    type Session = EtcdSession;
    type Election = EtcdElection;

    async fn new_session(&self, ttl: Duration) -> Result<EtcdSession> {
        let mut client = self.client.clone();
        let ttl_secs = ttl_seconds(ttl);

        let lease = client
            .lease_grant(ttl_secs, None)
            .await
            .map_err(|e| Error::coordination(format!("granting lease failed: {e}")))?;
        let lease_id = lease.id();

        let (keeper, stream) = match client.lease_keep_alive(lease_id).await {
            Ok(pair) => pair,
            Err(e) => {
                if let Err(revoke_err) = client.lease_revoke(lease_id).await {
                    debug!(lease_id, error = %revoke_err, "Revoking unused lease failed");
                }
                return Err(Error::coordination(format!(
                    "starting keep-alive for lease {lease_id:x} failed: {e}"
                )));
            }
        };

        let lost = CancellationToken::new();
        let renewer = LeaseRenewer {
            client: client.clone(),
            lease_id,
            ttl: Duration::from_secs(ttl_secs.unsigned_abs()),
            channel: Some((keeper, stream)),
            lost: lost.clone(),
        };
        let keepalive = tokio::spawn(renewer.run());

        info!(lease_id, ttl_secs, "Session established");

        Ok(EtcdSession {
            client,
            lease_id,
            lost,
            keepalive,
        })
    }

    fn new_election(&self, session: &EtcdSession, contest: &str) -> EtcdElection {
        EtcdElection {
            client: self.client.clone(),
            name: contest.to_string(),
            lease_id: session.lease_id,
            leader: None,
        }
    }
}

/// Lease TTL in whole seconds, rounded up, at least one second.
pub fn ttl_seconds(ttl: Duration) -> i64 {
    let secs = ttl.as_millis().div_ceil(1000).max(1);
    i64::try_from(secs).unwrap_or(i64::MAX)
}

/// An etcd lease kept alive by a background task.
pub struct EtcdSession {
    client: Client,
    lease_id: i64,
    lost: CancellationToken,
    keepalive: JoinHandle<()>,
}

impl EtcdSession {
    /// Lease backing this session.
    pub fn lease_id(&self) -> i64 {
        self.lease_id
    }
}

#[async_trait]
impl Session for EtcdSession {
    fn lost(&self) -> CancellationToken {
        self.lost.clone()
    }

    async fn close(self) -> Result<()> {
        self.keepalive.abort();

        let mut client = self.client.clone();
        match client.lease_revoke(self.lease_id).await {
            Ok(_) => {
                info!(lease_id = self.lease_id, "Session closed");
                Ok(())
            }
            // Already expired on the server; nothing left to release.
            Err(e) if e.to_string().contains("lease not found") => {
                debug!(lease_id = self.lease_id, "Lease already gone");
                Ok(())
            }
            Err(e) => Err(Error::coordination(format!(
                "revoking lease {:x} failed: {e}",
                self.lease_id
            ))),
        }
    }
}

impl Drop for EtcdSession {
    fn drop(&mut self) {
        self.keepalive.abort();
    }
}

/// Background renewal of one lease.
struct LeaseRenewer {
    client: Client,
    lease_id: i64,
    ttl: Duration,
    channel: Option<(LeaseKeeper, LeaseKeepAliveStream)>,
    lost: CancellationToken,
}

impl LeaseRenewer {
    async fn run(mut self) {
        let period = (self.ttl / 3).max(MIN_RENEW_PERIOD);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut expires_at = Instant::now() + self.ttl;

        loop {
            ticker.tick().await;

            match timeout(period, self.renew()).await {
                Ok(Ok(Some(remaining))) => {
                    trace!(lease_id = self.lease_id, remaining_secs = remaining.as_secs(), "Lease renewed");
                    expires_at = Instant::now() + remaining;
                }
                Ok(Ok(None)) => {
                    warn!(lease_id = self.lease_id, "Lease expired on the server");
                    break;
                }
                Ok(Err(e)) => {
                    warn!(lease_id = self.lease_id, error = %e, "Lease renewal failed");
                    self.channel = None;
                }
                Err(_) => {
                    warn!(lease_id = self.lease_id, "Lease renewal timed out");
                    self.channel = None;
                }
            }

            if Instant::now() >= expires_at {
                warn!(lease_id = self.lease_id, "Lease TTL elapsed without renewal");
                break;
            }
        }

        self.lost.cancel();
    }

    /// Send one keep-alive; `None` when the server reports the lease gone.
    async fn renew(&mut self) -> Result<Option<Duration>> {
        if self.channel.is_none() {
            let pair = self
                .client
                .lease_keep_alive(self.lease_id)
                .await
                .map_err(Error::coordination)?;
            self.channel = Some(pair);
        }

        let Some((keeper, stream)) = self.channel.as_mut() else {
            return Err(Error::coordination("keep-alive channel unavailable"));
        };

        keeper.keep_alive().await.map_err(Error::coordination)?;
        match stream.message().await.map_err(Error::coordination)? {
            Some(resp) if resp.ttl() > 0 => Ok(Some(Duration::from_secs(resp.ttl().unsigned_abs()))),
            Some(_) => Ok(None),
            None => Err(Error::coordination("keep-alive stream closed")),
        }
    }
}

/// Candidacy in an etcd election.
pub struct EtcdElection {
    client: Client,
    name: String,
    lease_id: i64,
    leader: Option<LeaderKey>,
}

impl EtcdElection {
    /// Whether the last campaign was won and not yet resigned.
    pub fn is_leader(&self) -> bool {
        self.leader.is_some()
    }
}

#[async_trait]
impl Election for EtcdElection {
    async fn campaign(&mut self, value: &str) -> Result<()> {
        if self.leader.is_some() {
            return Err(Error::coordination(format!(
                "already leading election {}",
                self.name
            )));
        }

        debug!(election = %self.name, value, "Campaigning");
        let resp = self
            .client
            .campaign(self.name.as_str(), value, self.lease_id)
            .await
            .map_err(|e| Error::coordination(format!("campaign on {} failed: {e}", self.name)))?;

        let leader = resp
            .leader()
            .cloned()
            .ok_or_else(|| Error::coordination("campaign response carried no leader key"))?;
        self.leader = Some(leader);
        Ok(())
    }

    async fn resign(&mut self) -> Result<()> {
        let Some(leader) = self.leader.take() else {
            return Ok(());
        };

        self.client
            .resign(Some(ResignOptions::new().with_leader(leader)))
            .await
            .map_err(|e| Error::coordination(format!("resign from {} failed: {e}", self.name)))?;
        debug!(election = %self.name, "Resigned");
        Ok(())
    }
}
