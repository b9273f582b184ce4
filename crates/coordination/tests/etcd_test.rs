//! etcd integration tests
//!
//! These tests need a reachable etcd cluster.
//! Run with: VIPKEEPER_ETCD_ENDPOINTS=http://127.0.0.1:2379 cargo test --test etcd_test
//!
//! Tests cover:
//! - Session creation and closing
//! - Mutual exclusion between two candidates
//! - Leadership hand-over on resign

use coordination::{Coordinator, Election, EtcdCoordinator, EtcdOptions, Session};
use std::time::Duration;
use tokio::time::timeout;

fn endpoints() -> Option<Vec<String>> {
    std::env::var("VIPKEEPER_ETCD_ENDPOINTS")
        .ok()
        .map(|v| v.split(',').map(str::to_string).collect())
}

async fn connect(endpoints: Vec<String>) -> EtcdCoordinator {
    EtcdCoordinator::connect(&EtcdOptions {
        endpoints,
        credentials: None,
        connect_timeout: Duration::from_secs(5),
        request_timeout: None,
    })
    .await
    .expect("Failed to connect to etcd")
}

fn contest(name: &str) -> String {
    format!("/vipkeeper-test/{}/{}", name, std::process::id())
}

#[tokio::test]
async fn test_session_lifecycle() {
    let Some(endpoints) = endpoints() else {
        println!("Skipping integration test (set VIPKEEPER_ETCD_ENDPOINTS to run)");
        return;
    };

    let coordinator = connect(endpoints).await;
    let session = coordinator.new_session(Duration::from_secs(5)).await.unwrap();
    let lost = session.lost();
    assert_ne!(session.lease_id(), 0);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!lost.is_cancelled(), "Session should be kept alive");

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_single_leader_and_handover() {
    let Some(endpoints) = endpoints() else {
        println!("Skipping integration test (set VIPKEEPER_ETCD_ENDPOINTS to run)");
        return;
    };
    let key = contest("handover");

    let coordinator = connect(endpoints).await;
    let first_session = coordinator.new_session(Duration::from_secs(5)).await.unwrap();
    let second_session = coordinator.new_session(Duration::from_secs(5)).await.unwrap();
    let mut first = coordinator.new_election(&first_session, &key);
    let mut second = coordinator.new_election(&second_session, &key);

    first.campaign("first").await.unwrap();
    assert!(first.is_leader());

    let mut pending = Box::pin(second.campaign("second"));
    assert!(
        timeout(Duration::from_millis(500), pending.as_mut()).await.is_err(),
        "Second candidate must wait while the first leads"
    );

    first.resign().await.unwrap();
    assert!(!first.is_leader());
    timeout(Duration::from_secs(5), pending)
        .await
        .expect("Second candidate should take over after resign")
        .unwrap();
    assert!(second.is_leader());

    second.resign().await.unwrap();
    first_session.close().await.unwrap();
    second_session.close().await.unwrap();
}
