//! Coordination service capabilities for vipkeeper.
//!
//! The leadership controller only sees the [`Coordinator`], [`Session`] and
//! [`Election`] traits. [`EtcdCoordinator`] implements them on top of etcd
//! leases and the etcd election service.
//!
//! # Example
//!
//! ```no_run
//! use coordination::{Coordinator, Election, EtcdCoordinator, EtcdOptions, Session};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = EtcdCoordinator::connect(&EtcdOptions {
//!     endpoints: vec!["http://127.0.0.1:2379".into()],
//!     credentials: None,
//!     connect_timeout: Duration::from_secs(5),
//!     request_timeout: None,
//! })
//! .await?;
//!
//! let session = coordinator.new_session(Duration::from_secs(15)).await?;
//! let mut election = coordinator.new_election(&session, "/vipkeeper/leader");
//! election.campaign("node-a").await?;
//! election.resign().await?;
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

mod coordinator;
mod etcd;

pub use coordinator::{Coordinator, Election, Session};
pub use etcd::{
    Credentials, EtcdCoordinator, EtcdElection, EtcdOptions, EtcdSession, ttl_seconds,
};
