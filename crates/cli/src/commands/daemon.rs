use crate::DaemonArgs;
use crate::error::Result;
use crate::signals::cancel_on_signal;

use std::path::Path;

use nodelet::{AssetBundle, Daemon, Nodelet, TickOutcome};
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, info, warn};

pub async fn daemon(args: DaemonArgs) -> Result<()> {
    let config = nodelet_config::load(args.config.as_deref(), &args.overrides())?;

    tracing_subscriber::fmt()
        .with_max_level(if config.debug {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .init();

    info!("nodelet version {}", env!("CARGO_PKG_VERSION"));
    match config.to_env_map().to_yaml() {
        Ok(yaml) => debug!("using config:\n{yaml}"),
        Err(e) => warn!("failed to render config: {e}"),
    }

    if let Err(e) = AssetBundle::default().extract(Path::new("/")) {
        warn!("failed to extract bundled assets: {e}");
    }

    let shutdown_token = CancellationToken::new();
    cancel_on_signal(shutdown_token.clone())?;

    let nodelet = Nodelet::from_config(config, shutdown_token.clone()).await?;
    let daemon = Daemon::new(nodelet, shutdown_token);
    daemon.start()?;

    match daemon.wait().await {
        TickOutcome::Restart => info!("configuration changed, exiting to be restarted"),
        TickOutcome::Continue => info!("node agent stopped"),
    }

    Ok(())
}
