//! Network interface lookup.

use common::{Error, Result};
use nix::net::if_::if_nametoindex;

/// Resolve an interface name to its kernel index.
///
/// Used at startup: a missing interface is a configuration error, not
/// something to retry.
pub fn resolve_interface(name: &str) -> Result<u32> {
    if name.is_empty() {
        return Err(Error::config("interface name is required"));
    }

    if_nametoindex(name)
        .map_err(|e| Error::config(format!("obtaining interface {name:?} failed: {e}")))
}
