// File: keeper/src/shutdown.rs
use std::io;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Install a shutdown handler that listens for SIGTERM and SIGINT.
///
/// Both handlers are registered before this returns, so a signal delivered
/// afterwards always cancels the token. Registration failures are returned
/// to the caller. Must be called from within a Tokio runtime.
pub fn install_shutdown_handler() -> io::Result<CancellationToken> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, initiating graceful shutdown");
            }
        }

        token_clone.cancel();
    });

    Ok(token)
}
