use crate::error::{Error, Result};

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancels `token` on the first SIGTERM, SIGINT or SIGHUP.
pub fn cancel_on_signal(token: CancellationToken) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| Error::Io("failed to install SIGTERM handler", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| Error::Io("failed to install SIGINT handler", e))?;
    let mut sighup = signal(SignalKind::hangup())
        .map_err(|e| Error::Io("failed to install SIGHUP handler", e))?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
            _ = sighup.recv() => info!("received SIGHUP"),
            () = token.cancelled() => return,
        }

        info!("shutting down");
        token.cancel();
    });

    Ok(())
}
