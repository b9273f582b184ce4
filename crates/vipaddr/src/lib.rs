//! Virtual IP address management for vipkeeper.
//!
//! Describes the floating address ([`VirtualAddress`]) and applies it to a
//! network interface through the idempotent [`AddressBinder`] capability.
//! The production binder drives iproute2:
//!
//! ```no_run
//! use vipaddr::{AddressBinder, IpCommandBinder, VirtualAddress};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let vip = VirtualAddress::new("10.0.0.5".parse()?, 24, "eth0")?;
//! let binder = IpCommandBinder::new();
//!
//! // Requires CAP_NET_ADMIN
//! binder.bind(&vip).await?;
//! binder.unbind(&vip).await?;
//! # Ok(())
//! # }
//! ```

mod binder;
mod interface;
mod types;

pub use binder::{AddressBinder, DEFAULT_COMMAND_TIMEOUT, IpCommandBinder};
pub use interface::resolve_interface;
pub use types::{
    AddressAction, DEFAULT_IPV6_PREFIX, DEFAULT_NETMASK, VirtualAddress, default_prefix,
    resolve_prefix,
};
