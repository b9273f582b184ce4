//! Leadership lifecycle controller
//!
//! Keeps one virtual IP address bound on whichever candidate host currently
//! leads an election held on a coordination service.
//!
//! # Guarantees
//!
//! - The address is bound only after a campaign is won
//! - Every way out of leadership unbinds first, then resigns, then closes the session
//! - Shutdown is a cancellation token; it ends the loop in bounded time
//! - Failed session creation or campaign is retried after exponential backoff
//!
//! # Example
//!
//! ```no_run
//! use coordination::{EtcdCoordinator, EtcdOptions};
//! use keeper::{Keeper, KeeperSettings};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use vipaddr::{IpCommandBinder, VirtualAddress};
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
//! let settings = KeeperSettings {
//!     address: VirtualAddress::new("10.0.0.5".parse()?, 24, "eth0")?,
//!     contest: "/vipkeeper/leader".into(),
//!     candidate: "node-a".into(),
//!     interval: Duration::from_secs(1),
//! };
//!
//! let shutdown = CancellationToken::new();
//! let mut keeper = Keeper::new(settings, coordinator, IpCommandBinder::new());
//!
//! // Requires CAP_NET_ADMIN
//! let stats = keeper.run(shutdown).await;
//! println!("{stats:?}");
//! # Ok(())
//! # }
//! ```

mod backoff;
mod state_machine;
mod types;

pub use backoff::Backoff;
pub use state_machine::Keeper;
pub use types::{
    KeeperSettings, KeeperStats, LeadershipState, MAX_BACKOFF_FACTOR, RELEASE_TIMEOUT_FACTOR,
    SESSION_TTL_FACTOR,
};
