//! Termination signals as a cancellation token.

use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancel `shutdown` on the first SIGINT or SIGTERM.
///
/// Later signals are only logged; the controller is already releasing.
pub fn spawn_signal_handler(shutdown: CancellationToken) -> std::io::Result<JoinHandle<()>> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        let mut received = 0u32;
        loop {
            let name = tokio::select! {
                Some(()) = interrupt.recv() => "SIGINT",
                Some(()) = terminate.recv() => "SIGTERM",
                else => break,
            };

            received += 1;
            if received == 1 {
                info!(signal = name, "Received signal, shutting down");
                shutdown.cancel();
            } else {
                warn!(signal = name, "Received signal, shutdown already in progress");
            }
        }
    }))
}
