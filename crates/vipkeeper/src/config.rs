//! Configuration loading and validation for vipkeeper
//!
//! Sources, lowest precedence first: built-in defaults, an optional YAML
//! file, `VIP_*` environment variables, command-line flags. The deprecated
//! names `mask` and `iface` are still accepted for `netmask` and `interface`.

use clap::Parser;
use common::LogFormat;
use coordination::{Credentials, EtcdOptions};
use keeper::{KeeperSettings, RELEASE_TIMEOUT_FACTOR};
use serde::Deserialize;
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use validator::{Validate, ValidationError};
use vipaddr::VirtualAddress;

/// Endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:2379";

/// Default renewal interval in milliseconds.
pub const DEFAULT_INTERVAL_MS: u64 = 1000;

/// Default election (contest) key.
pub const DEFAULT_ELECTION_KEY: &str = "/vipkeeper/leader";

const DEFAULT_LOG_LEVEL: &str = "info";

/// Longest interface name the kernel accepts (IFNAMSIZ - 1).
const MAX_INTERFACE_NAME: usize = 15;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Mandatory settings not set: {}", .0.join(", "))]
    MissingMandatory(Vec<&'static str>),

    #[error(
        "Conflicting settings: {deprecated} ({deprecated_value}) and {current} ({current_value}) are both set"
    )]
    Conflict {
        deprecated: &'static str,
        deprecated_value: String,
        current: &'static str,
        current_value: String,
    },

    #[error("Invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("User {0:?} is set but no password was given")]
    MissingPassword(String),
}

/// Command-line flags; every flag can also come from its `VIP_*` variable.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "vipkeeper",
    version,
    about = "Keeps a virtual IP address on the leader of an etcd election"
)]
pub struct Cli {
    /// YAML configuration file
    #[arg(long, short = 'c', env = "VIP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Virtual IP address to configure
    #[arg(long, env = "VIP_IP")]
    pub ip: Option<String>,

    /// Prefix length for the address; -1 uses the address family default
    #[arg(long, env = "VIP_NETMASK", allow_hyphen_values = true)]
    pub netmask: Option<i32>,

    /// Deprecated, use --netmask
    #[arg(long, env = "VIP_MASK", allow_hyphen_values = true, hide = true)]
    pub mask: Option<i32>,

    /// Network interface to configure the address on
    #[arg(long, env = "VIP_INTERFACE")]
    pub interface: Option<String>,

    /// Deprecated, use --interface
    #[arg(long, env = "VIP_IFACE", hide = true)]
    pub iface: Option<String>,

    /// etcd endpoints, comma separated [default: http://127.0.0.1:2379]
    #[arg(long, env = "VIP_ENDPOINTS", value_delimiter = ',')]
    pub endpoints: Option<Vec<String>>,

    /// Username for etcd authentication
    #[arg(long, env = "VIP_USER")]
    pub user: Option<String>,

    /// Password for etcd authentication
    #[arg(long, env = "VIP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Lease renewal interval in milliseconds [default: 1000]
    #[arg(long, env = "VIP_INTERVAL")]
    pub interval: Option<u64>,

    /// Election key shared by all candidates [default: /vipkeeper/leader]
    #[arg(long, env = "VIP_ELECTION_KEY")]
    pub election_key: Option<String>,

    /// Value published while leading [default: host name]
    #[arg(long, env = "VIP_NODE_NAME")]
    pub node_name: Option<String>,

    /// Log output format: plain or json
    #[arg(long, env = "VIP_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    /// Default log level, overridden by RUST_LOG
    #[arg(long, env = "VIP_LOG_LEVEL")]
    pub log_level: Option<String>,
}

/// Endpoints as written in YAML: a list or one comma separated string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EndpointList {
    List(Vec<String>),
    Joined(String),
}

impl EndpointList {
    fn into_vec(self) -> Vec<String> {
        match self {
            EndpointList::List(list) => list,
            EndpointList::Joined(joined) => joined.split(',').map(str::to_string).collect(),
        }
    }
}

/// Contents of the YAML configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub ip: Option<String>,
    pub netmask: Option<i32>,
    pub mask: Option<i32>,
    pub interface: Option<String>,
    pub iface: Option<String>,
    pub endpoints: Option<EndpointList>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub interval: Option<u64>,
    pub election_key: Option<String>,
    pub node_name: Option<String>,
    pub log_format: Option<LogFormat>,
    pub log_level: Option<String>,
}

impl FileConfig {
    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Find configuration file in standard locations
    fn find() -> Option<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/vipkeeper/vipkeeper.yaml")];

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config/vipkeeper/vipkeeper.yaml"));
        }

        paths.push(PathBuf::from("./vipkeeper.yaml"));

        paths.into_iter().find(|p| p.is_file())
    }
}

/// Effective, validated configuration.
#[derive(Debug, Clone, Validate)]
pub struct Settings {
    pub ip: IpAddr,
    pub netmask: i32,
    #[validate(custom = "validate_interface")]
    pub interface: String,
    #[validate(length(min = 1))]
    pub endpoints: Vec<String>,
    pub credentials: Option<Credentials>,
    #[validate(range(min = 100, max = 60000))]
    pub interval_ms: u64,
    #[validate(custom = "validate_election_key")]
    pub election_key: String,
    #[validate(length(min = 1))]
    pub node_name: String,
    pub log_format: LogFormat,
    pub log_level: String,
}

/// Result of [`Settings::load`].
#[derive(Debug)]
pub struct LoadedConfig {
    pub settings: Settings,
    /// File the settings were read from, if any
    pub source: Option<PathBuf>,
    /// Warnings to log once logging is up
    pub notices: Vec<String>,
}

fn validate_interface(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() || name.len() > MAX_INTERFACE_NAME {
        return Err(ValidationError::new("interface_name_length"));
    }
    if name.contains('/') || name.chars().any(char::is_whitespace) {
        return Err(ValidationError::new("interface_name_invalid"));
    }
    Ok(())
}

fn validate_election_key(key: &str) -> Result<(), ValidationError> {
    if !key.starts_with('/') || key.len() < 2 {
        return Err(ValidationError::new("election_key_not_absolute"));
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Merge a deprecated setting into its replacement.
fn resolve_deprecated<T>(
    deprecated: &'static str,
    deprecated_value: Option<T>,
    current: &'static str,
    current_value: Option<T>,
    notices: &mut Vec<String>,
) -> Result<Option<T>, ConfigError>
where
    T: PartialEq + fmt::Display,
{
    let Some(old) = deprecated_value else {
        return Ok(current_value);
    };
    notices.push(format!(
        "Setting \"{deprecated}\" is deprecated, please use \"{current}\" instead"
    ));

    match current_value {
        None => Ok(Some(old)),
        Some(new) if new == old => {
            notices.push(format!(
                "Both \"{deprecated}\" and \"{current}\" are set to {new}, ignoring \"{deprecated}\""
            ));
            Ok(Some(new))
        }
        Some(new) => Err(ConfigError::Conflict {
            deprecated,
            deprecated_value: old.to_string(),
            current,
            current_value: new.to_string(),
        }),
    }
}

fn default_node_name() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_default()
}

impl Settings {
    /// Load from the configuration file (explicit or searched) and `cli`.
    pub fn load(cli: &Cli) -> Result<LoadedConfig, ConfigError> {
        let source = match &cli.config {
            Some(path) if !path.is_file() => return Err(ConfigError::FileNotFound(path.clone())),
            Some(path) => Some(path.clone()),
            None => FileConfig::find(),
        };

        let file = match &source {
            Some(path) => FileConfig::load_from_file(path)?,
            None => FileConfig::default(),
        };

        let (settings, notices) = Self::merge(cli, file)?;
        Ok(LoadedConfig {
            settings,
            source,
            notices,
        })
    }

    /// Layer `cli` over `file` and validate the result.
    pub fn merge(cli: &Cli, file: FileConfig) -> Result<(Self, Vec<String>), ConfigError> {
        let mut notices = Vec::new();

        let netmask = resolve_deprecated(
            "mask",
            cli.mask.or(file.mask),
            "netmask",
            cli.netmask.or(file.netmask),
            &mut notices,
        )?;
        let interface = resolve_deprecated(
            "iface",
            non_empty(cli.iface.clone().or(file.iface)),
            "interface",
            non_empty(cli.interface.clone().or(file.interface)),
            &mut notices,
        )?;
        let ip = non_empty(cli.ip.clone().or(file.ip));

        let mut missing = Vec::new();
        if ip.is_none() {
            missing.push("ip");
        }
        if netmask.is_none() {
            missing.push("netmask");
        }
        if interface.is_none() {
            missing.push("interface");
        }
        let (Some(ip), Some(netmask), Some(interface)) = (ip, netmask, interface) else {
            return Err(ConfigError::MissingMandatory(missing));
        };

        let ip = ip.parse::<IpAddr>().map_err(|e| ConfigError::InvalidValue {
            name: "ip",
            value: ip.clone(),
            reason: e.to_string(),
        })?;

        let mut endpoints: Vec<String> = cli
            .endpoints
            .clone()
            .or_else(|| file.endpoints.map(EndpointList::into_vec))
            .unwrap_or_default()
            .into_iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
        if endpoints.is_empty() {
            notices.push(format!(
                "No endpoints specified, trying {DEFAULT_ENDPOINT}"
            ));
            endpoints.push(DEFAULT_ENDPOINT.to_string());
        }

        let user = non_empty(cli.user.clone().or(file.user));
        let password = cli.password.clone().or(file.password).filter(|p| !p.is_empty());
        let credentials = match (user, password) {
            (Some(user), Some(password)) => Some(Credentials { user, password }),
            (Some(user), None) => return Err(ConfigError::MissingPassword(user)),
            (None, Some(_)) => {
                notices.push("Password is set without a user, ignoring it".to_string());
                None
            }
            (None, None) => None,
        };

        let settings = Settings {
            ip,
            netmask,
            interface,
            endpoints,
            credentials,
            interval_ms: cli.interval.or(file.interval).unwrap_or(DEFAULT_INTERVAL_MS),
            election_key: non_empty(cli.election_key.clone().or(file.election_key))
                .unwrap_or_else(|| DEFAULT_ELECTION_KEY.to_string()),
            node_name: non_empty(cli.node_name.clone().or(file.node_name))
                .unwrap_or_else(default_node_name),
            log_format: cli.log_format.or(file.log_format).unwrap_or_default(),
            log_level: non_empty(cli.log_level.clone().or(file.log_level))
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        };

        settings.validate()?;
        settings
            .virtual_address()
            .map_err(|e| ConfigError::InvalidValue {
                name: "netmask",
                value: settings.netmask.to_string(),
                reason: e.to_string(),
            })?;

        Ok((settings, notices))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn virtual_address(&self) -> common::Result<VirtualAddress> {
        VirtualAddress::new(self.ip, self.netmask, self.interface.clone())
    }

    /// Settings for the leadership controller.
    pub fn keeper_settings(&self) -> common::Result<KeeperSettings> {
        let settings = KeeperSettings {
            address: self.virtual_address()?,
            contest: self.election_key.clone(),
            candidate: self.node_name.clone(),
            interval: self.interval(),
        };
        settings.validate().map_err(common::Error::config)?;
        Ok(settings)
    }

    pub fn etcd_options(&self) -> EtcdOptions {
        EtcdOptions {
            endpoints: self.endpoints.clone(),
            credentials: self.credentials.clone(),
            connect_timeout: self.interval() * RELEASE_TIMEOUT_FACTOR,
            request_timeout: None,
        }
    }

    /// Log the effective configuration. The password is never printed.
    pub fn log_effective(&self) {
        info!(
            ip = %self.ip,
            netmask = self.netmask,
            interface = %self.interface,
            endpoints = ?self.endpoints,
            user = self.credentials.as_ref().map_or("", |c| c.user.as_str()),
            password = if self.credentials.is_some() { "<redacted>" } else { "" },
            interval_ms = self.interval_ms,
            election_key = %self.election_key,
            node_name = %self.node_name,
            log_format = %self.log_format,
            log_level = %self.log_level,
            "Effective configuration"
        );
    }
}
