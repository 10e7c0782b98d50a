//! Signal handling for graceful shutdown.
//!
//! SIGINT and SIGTERM cancel a [`CancellationToken`] that the daemon
//! observes between ticks.

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Spawn a task that cancels `token` on the first SIGINT or SIGTERM.
///
/// If signal handlers cannot be registered (e.g., in restricted environments),
/// the token is simply never cancelled by a signal.
pub fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        // Registration may fail in containers or restricted envs
        let sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("Failed to register SIGINT handler: {}", e);
                None
            }
        };

        let sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                None
            }
        };

        match (sigint, sigterm) {
            (Some(mut int), Some(mut term)) => {
                tokio::select! {
                    _ = int.recv() => info!("Received SIGINT, initiating graceful shutdown..."),
                    _ = term.recv() => info!("Received SIGTERM, initiating graceful shutdown..."),
                }
            }
            (Some(mut int), None) => {
                int.recv().await;
                info!("Received SIGINT, initiating graceful shutdown...");
            }
            (None, Some(mut term)) => {
                term.recv().await;
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
            (None, None) => {
                warn!("No signal handlers registered - graceful shutdown disabled");
                return;
            }
        }
        token.cancel();
    });
}

/// Token cancelled by SIGINT/SIGTERM
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    cancel_on_signal(token.clone());
    token
}
