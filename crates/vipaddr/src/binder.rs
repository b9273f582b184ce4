//! Applying the virtual address to a network interface.

use crate::types::{AddressAction, VirtualAddress};
use async_trait::async_trait;
use common::{Error, Result};
use std::ffi::OsString;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Default upper bound for a single `ip addr` invocation.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Adds or removes the virtual address on the host.
///
/// Implementations must be idempotent: adding an address that is already
/// present, or deleting one that is absent, succeeds.
#[async_trait]
pub trait AddressBinder: Send + Sync {
    /// Perform `action` for `address`.
    async fn apply(&self, action: AddressAction, address: &VirtualAddress) -> Result<()>;

    /// Add the address to its interface.
    async fn bind(&self, address: &VirtualAddress) -> Result<()> {
        self.apply(AddressAction::Add, address).await
    }

    /// Remove the address from its interface.
    async fn unbind(&self, address: &VirtualAddress) -> Result<()> {
        self.apply(AddressAction::Delete, address).await
    }
}

/// Binder that shells out to iproute2 (`ip addr add|delete <cidr> dev <iface>`).
#[derive(Debug, Clone)]
pub struct IpCommandBinder {
    program: OsString,
    leading_args: Vec<OsString>,
    command_timeout: Duration,
}

impl Default for IpCommandBinder {
    fn default() -> Self {
        Self::new()
    }
}

impl IpCommandBinder {
    /// Binder using `ip` from `PATH`.
    pub fn new() -> Self {
        Self {
            program: OsString::from("ip"),
            leading_args: Vec::new(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Use a different program, with arguments placed before `addr ...`.
    pub fn with_command<I, S>(mut self, program: impl Into<OsString>, leading_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.program = program.into();
        self.leading_args = leading_args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }

    fn command(&self, action: AddressAction, address: &VirtualAddress) -> Command {
        let cidr = address.cidr();
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .args(["addr", action.as_str(), cidr.as_str(), "dev", address.interface()])
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl AddressBinder for IpCommandBinder {
    async fn apply(&self, action: AddressAction, address: &VirtualAddress) -> Result<()> {
        debug!(action = %action, address = %address, "Running ip addr");

        let output = timeout(self.command_timeout, self.command(action, address).output())
            .await
            .map_err(|_| Error::timeout("ip addr", self.command_timeout))??;

        if output.status.success() {
            info!(action = %action, address = %address, "Address configuration applied");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();

        if already_in_state(action, stderr) {
            debug!(action = %action, address = %address, output = stderr, "Address already in desired state");
            return Ok(());
        }

        warn!(
            action = %action,
            address = %address,
            status = %output.status,
            output = stderr,
            "ip addr failed"
        );
        Err(Error::address(format!(
            "ip addr {} {} failed ({}): {}",
            action, address, output.status, stderr
        )))
    }
}

/// Recognise iproute2 messages meaning the address is already where we want it.
fn already_in_state(action: AddressAction, stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    match action {
        AddressAction::Add => {
            stderr.contains("file exists") || stderr.contains("address already assigned")
        }
        AddressAction::Delete => {
            stderr.contains("cannot assign requested address")
                || stderr.contains("address not found")
        }
    }
}
