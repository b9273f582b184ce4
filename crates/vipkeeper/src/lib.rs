//! vipkeeper: keeps a virtual IP address on the leader of an etcd election
//!
//! Startup wiring for the binary. Configuration problems and an interface
//! that does not exist are fatal; everything after that is retried by the
//! leadership controller until a termination signal arrives.

pub mod config;
pub mod signal;

pub use config::{Cli, ConfigError, FileConfig, LoadedConfig, Settings};
pub use signal::spawn_signal_handler;

use coordination::EtcdCoordinator;
use keeper::{Keeper, KeeperStats};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vipaddr::{IpCommandBinder, resolve_interface};

/// Errors that stop the process before the controller runs.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Runtime(#[from] common::Error),

    #[error("Installing signal handlers failed: {0}")]
    Signal(#[from] std::io::Error),
}

/// Load configuration, start logging and run until a termination signal.
pub async fn run(cli: &Cli) -> Result<KeeperStats, StartupError> {
    let loaded = Settings::load(cli)?;
    let settings = loaded.settings;

    common::logging::init(settings.log_format, &settings.log_level);
    info!(version = env!("CARGO_PKG_VERSION"), "vipkeeper starting");

    match &loaded.source {
        Some(path) => info!(path = %path.display(), "Loaded configuration file"),
        None => info!("No configuration file found, using flags and environment"),
    }
    for notice in &loaded.notices {
        warn!("{notice}");
    }
    settings.log_effective();

    let if_index = resolve_interface(&settings.interface)?;
    debug!(interface = %settings.interface, if_index, "Interface resolved");

    let keeper_settings = settings.keeper_settings()?;

    let shutdown = CancellationToken::new();
    let signals = spawn_signal_handler(shutdown.clone())?;

    let coordinator = EtcdCoordinator::connect(&settings.etcd_options()).await?;
    let mut keeper = Keeper::new(keeper_settings, coordinator, IpCommandBinder::new());
    let stats = keeper.run(shutdown).await;

    signals.abort();
    info!(?stats, "vipkeeper stopped");
    Ok(stats)
}
