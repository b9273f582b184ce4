//! Virtual address data types.

use common::{Error, Result};
use std::net::IpAddr;

/// Netmask value meaning "use the default prefix of the address family".
pub const DEFAULT_NETMASK: i32 = -1;

/// Prefix used for IPv6 addresses when no netmask is given.
pub const DEFAULT_IPV6_PREFIX: u8 = 128;

/// Action applied to the interface address list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressAction {
    /// Add the address to the interface
    Add,
    /// Remove the address from the interface
    Delete,
}

impl AddressAction {
    /// Verb understood by `ip addr`.
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressAction::Add => "add",
            AddressAction::Delete => "delete",
        }
    }
}

impl std::fmt::Display for AddressAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The floating address managed by this host: address, prefix and interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualAddress {
    ip: IpAddr,
    prefix_len: u8,
    interface: String,
}

impl VirtualAddress {
    /// Build a virtual address from a raw netmask setting.
    ///
    /// `netmask` is either a prefix length valid for the address family or
    /// [`DEFAULT_NETMASK`].
    pub fn new(ip: IpAddr, netmask: i32, interface: impl Into<String>) -> Result<Self> {
        let interface = interface.into();
        if interface.trim().is_empty() {
            return Err(Error::config("interface name is required"));
        }

        Ok(Self {
            ip,
            prefix_len: resolve_prefix(ip, netmask)?,
            interface,
        })
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Address in `addr/prefix` notation.
    pub fn cidr(&self) -> String {
        format!("{}/{}", self.ip, self.prefix_len)
    }
}

impl std::fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} dev {}", self.cidr(), self.interface)
    }
}

/// Resolve the prefix length for `ip` from a configured netmask.
pub fn resolve_prefix(ip: IpAddr, netmask: i32) -> Result<u8> {
    if netmask == DEFAULT_NETMASK {
        return Ok(default_prefix(ip));
    }

    let max = match ip {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };

    match u8::try_from(netmask) {
        Ok(prefix) if (1..=max).contains(&prefix) => Ok(prefix),
        _ => Err(Error::config(format!(
            "netmask {netmask} is invalid for {ip} (expected 1-{max} or {DEFAULT_NETMASK})"
        ))),
    }
}

/// Classful default prefix for IPv4, host prefix for IPv6.
pub fn default_prefix(ip: IpAddr) -> u8 {
    match ip {
        IpAddr::V4(v4) => match v4.octets()[0] {
            0..=127 => 8,
            128..=191 => 16,
            _ => 24,
        },
        IpAddr::V6(_) => DEFAULT_IPV6_PREFIX,
    }
}
