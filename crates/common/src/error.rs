//! Common error types for vipkeeper components.

use std::fmt;
use std::time::Duration;

/// A specialized Result type for vipkeeper operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for vipkeeper operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Coordination error: {0}")]
    Coordination(String),

    #[error("Address error: {0}")]
    Address(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{operation} timed out after {}ms", .after.as_millis())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

impl Error {
    /// Create a new coordination service error.
    pub fn coordination(msg: impl fmt::Display) -> Self {
        Error::Coordination(msg.to_string())
    }

    /// Create a new address binding error.
    pub fn address(msg: impl fmt::Display) -> Self {
        Error::Address(msg.to_string())
    }

    /// Create a new configuration error.
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new timeout error.
    pub fn timeout(operation: &'static str, after: Duration) -> Self {
        Error::Timeout { operation, after }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = Error::timeout("resign", Duration::from_millis(5000));
        assert_eq!(err.to_string(), "resign timed out after 5000ms");
    }

    #[test]
    fn test_constructors() {
        assert!(matches!(Error::address("boom"), Error::Address(m) if m == "boom"));
        assert!(matches!(Error::config("x"), Error::Config(m) if m == "x"));
        assert_eq!(
            Error::coordination("lease").to_string(),
            "Coordination error: lease"
        );
    }
}
