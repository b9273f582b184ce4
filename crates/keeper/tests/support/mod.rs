//! Scriptable coordinator and binder recording every call in one ordered log.

#![allow(dead_code)]

use async_trait::async_trait;
use common::{Error, Result};
use coordination::{Coordinator, Election, Session};
use keeper::KeeperSettings;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use vipaddr::{AddressAction, AddressBinder, VirtualAddress};

/// Observable call made by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    NewSession(u32),
    SessionFailed,
    Campaign(u32, String),
    Bind(String, String),
    Unbind(String, String),
    Resign(u32),
    Close(u32),
}

/// Shared, timestamped call log.
#[derive(Clone)]
pub struct EventLog {
    tx: Arc<watch::Sender<Vec<(Instant, Event)>>>,
}

impl Default for EventLog {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self { tx: Arc::new(tx) }
    }
}

impl EventLog {
    pub fn push(&self, event: Event) {
        self.tx.send_modify(|entries| entries.push((Instant::now(), event)));
    }

    pub fn events(&self) -> Vec<Event> {
        self.tx.borrow().iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn position(&self, event: &Event) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }

    pub fn time_of(&self, event: &Event) -> Instant {
        self.tx
            .borrow()
            .iter()
            .find(|(_, e)| e == event)
            .map(|(at, _)| *at)
            .unwrap_or_else(|| panic!("{event:?} was never recorded"))
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }

    /// Wait (in virtual time) until `event` has been recorded.
    pub async fn wait_for(&self, event: Event) {
        let mut rx = self.tx.subscribe();
        let found = tokio::time::timeout(
            Duration::from_secs(3600),
            rx.wait_for(|entries| entries.iter().any(|(_, e)| *e == event)),
        )
        .await;
        assert!(
            matches!(found, Ok(Ok(_))),
            "timed out waiting for {event:?}, saw {:?}",
            self.events()
        );
    }
}

/// What a campaign call does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignScript {
    Win,
    Fail,
    /// Loses the session, then reports a win
    WinAfterLoss,
    /// Never returns; the default once the script runs out
    Pending,
}

struct Inner {
    log: EventLog,
    next_session: AtomicU32,
    session_failures: Mutex<VecDeque<bool>>,
    campaigns: Mutex<VecDeque<CampaignScript>>,
    lost: Mutex<Vec<(u32, CancellationToken)>>,
    resign_fails: AtomicBool,
    resign_hangs: AtomicBool,
    close_fails: AtomicBool,
}

/// In-process coordinator driven by scripts.
#[derive(Clone)]
pub struct FakeCoordinator {
    inner: Arc<Inner>,
}

impl FakeCoordinator {
    pub fn new(log: EventLog) -> Self {
        Self {
            inner: Arc::new(Inner {
                log,
                next_session: AtomicU32::new(1),
                session_failures: Mutex::new(VecDeque::new()),
                campaigns: Mutex::new(VecDeque::new()),
                lost: Mutex::new(Vec::new()),
                resign_fails: AtomicBool::new(false),
                resign_hangs: AtomicBool::new(false),
                close_fails: AtomicBool::new(false),
            }),
        }
    }

    /// Outcomes of the next campaigns, in order.
    pub fn script_campaigns(&self, scripts: impl IntoIterator<Item = CampaignScript>) {
        self.inner.campaigns.lock().unwrap().extend(scripts);
    }

    /// Outcomes of the next session creations; `true` fails.
    pub fn script_session_failures(&self, failures: impl IntoIterator<Item = bool>) {
        self.inner.session_failures.lock().unwrap().extend(failures);
    }

    pub fn fail_resign(&self) {
        self.inner.resign_fails.store(true, Ordering::SeqCst);
    }

    pub fn hang_resign(&self) {
        self.inner.resign_hangs.store(true, Ordering::SeqCst);
    }

    pub fn fail_close(&self) {
        self.inner.close_fails.store(true, Ordering::SeqCst);
    }

    /// Fire the liveness signal of session `id`.
    pub fn lose_session(&self, id: u32) {
        let lost = self.inner.lost.lock().unwrap();
        let (_, token) = lost
            .iter()
            .find(|(sid, _)| *sid == id)
            .unwrap_or_else(|| panic!("no session {id}"));
        token.cancel();
    }
}

pub struct FakeSession {
    id: u32,
    inner: Arc<Inner>,
    lost: CancellationToken,
}

#[async_trait]
impl Session for FakeSession {
    fn lost(&self) -> CancellationToken {
        self.lost.clone()
    }

    async fn close(self) -> Result<()> {
        self.inner.log.push(Event::Close(self.id));
        if self.inner.close_fails.load(Ordering::SeqCst) {
            return Err(Error::coordination("lease revoke failed"));
        }
        Ok(())
    }
}

pub struct FakeElection {
    session: u32,
    lost: CancellationToken,
    inner: Arc<Inner>,
}

#[async_trait]
impl Election for FakeElection {
    async fn campaign(&mut self, value: &str) -> Result<()> {
        self.inner
            .log
            .push(Event::Campaign(self.session, value.to_string()));
        let script = self
            .inner
            .campaigns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(CampaignScript::Pending);

        match script {
            CampaignScript::Win => Ok(()),
            CampaignScript::Fail => Err(Error::coordination("etcdserver: request timed out")),
            CampaignScript::WinAfterLoss => {
                self.lost.cancel();
                Ok(())
            }
            CampaignScript::Pending => std::future::pending::<Result<()>>().await,
        }
    }

    async fn resign(&mut self) -> Result<()> {
        self.inner.log.push(Event::Resign(self.session));
        if self.inner.resign_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.inner.resign_fails.load(Ordering::SeqCst) {
            return Err(Error::coordination("resign failed"));
        }
        Ok(())
    }
}

#[async_trait]
impl Coordinator for FakeCoordinator {
    type Session = FakeSession;
    type Election = FakeElection;

    async fn new_session(&self, _ttl: Duration) -> Result<FakeSession> {
        let fail = self
            .inner
            .session_failures
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(false);
        if fail {
            self.inner.log.push(Event::SessionFailed);
            return Err(Error::coordination("connection refused"));
        }

        let id = self.inner.next_session.fetch_add(1, Ordering::SeqCst);
        let lost = CancellationToken::new();
        self.inner.lost.lock().unwrap().push((id, lost.clone()));
        self.inner.log.push(Event::NewSession(id));

        Ok(FakeSession {
            id,
            inner: self.inner.clone(),
            lost,
        })
    }

    fn new_election(&self, session: &FakeSession, _contest: &str) -> FakeElection {
        FakeElection {
            session: session.id,
            lost: session.lost.clone(),
            inner: self.inner.clone(),
        }
    }
}

/// Binder recording calls; failures are scripted per action.
#[derive(Clone)]
pub struct FakeBinder {
    log: EventLog,
    bind_failures: Arc<Mutex<VecDeque<bool>>>,
    unbind_fails: Arc<AtomicBool>,
}

impl FakeBinder {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            bind_failures: Arc::new(Mutex::new(VecDeque::new())),
            unbind_fails: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Outcomes of the next binds; `true` fails.
    pub fn script_bind_failures(&self, failures: impl IntoIterator<Item = bool>) {
        self.bind_failures.lock().unwrap().extend(failures);
    }

    pub fn fail_unbind(&self) {
        self.unbind_fails.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AddressBinder for FakeBinder {
    async fn apply(&self, action: AddressAction, address: &VirtualAddress) -> Result<()> {
        let cidr = address.cidr();
        let iface = address.interface().to_string();
        match action {
            AddressAction::Add => {
                self.log.push(Event::Bind(cidr, iface));
                let fail = self.bind_failures.lock().unwrap().pop_front().unwrap_or(false);
                if fail {
                    return Err(Error::address("RTNETLINK answers: Operation not permitted"));
                }
            }
            AddressAction::Delete => {
                self.log.push(Event::Unbind(cidr, iface));
                if self.unbind_fails.load(Ordering::SeqCst) {
                    return Err(Error::address("RTNETLINK answers: Operation not permitted"));
                }
            }
        }
        Ok(())
    }
}

pub const CANDIDATE: &str = "node-a";

/// `10.0.0.5/24` on `eth0`, one second interval.
pub fn settings() -> KeeperSettings {
    KeeperSettings {
        address: VirtualAddress::new("10.0.0.5".parse().unwrap(), 24, "eth0").unwrap(),
        contest: "/vipkeeper/leader".to_string(),
        candidate: CANDIDATE.to_string(),
        interval: Duration::from_secs(1),
    }
}

pub fn bind_event() -> Event {
    Event::Bind("10.0.0.5/24".to_string(), "eth0".to_string())
}

pub fn unbind_event() -> Event {
    Event::Unbind("10.0.0.5/24".to_string(), "eth0".to_string())
}

pub fn campaign_event(session: u32) -> Event {
    Event::Campaign(session, CANDIDATE.to_string())
}
