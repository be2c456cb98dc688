use crate::nodelet::{Nodelet, TickOutcome};
use crate::{Error, Result};

use std::sync::Arc;
use std::time::Duration;

use nodelet_extension_file::NodeState;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

impl Nodelet {
    /// Runs the reconcile loop until it is cancelled, a single tick has run
    /// in one-shot mode, or a configuration update asks for a restart.
    ///
    /// Ticks never overlap: the interval sleep starts after a tick finishes.
    pub async fn run(&mut self, ctx: &CancellationToken) -> TickOutcome {
        match self.persist_and_update_config().await {
            Ok(TickOutcome::Restart) => return TickOutcome::Restart,
            Ok(TickOutcome::Continue) => {}
            Err(e) => error!("failed to apply configuration update: {e}"),
        }

        if self.config.cluster_id.is_empty() {
            self.state.node_state = NodeState::Ok;
            self.state.start_attempts = 0;
        }
        if let Err(e) = self.set_kube_env_symlink() {
            warn!("failed to set kube.env symlink: {e}");
        }

        let interval = Duration::from_secs(self.config.loop_interval);
        loop {
            if ctx.is_cancelled() {
                info!("reconcile loop cancelled");
                return TickOutcome::Continue;
            }

            if self.reconcile(ctx).await == TickOutcome::Restart {
                info!("configuration changed, exiting for restart");
                return TickOutcome::Restart;
            }

            if self.config.disable_loop {
                info!("single tick mode, exiting");
                return TickOutcome::Continue;
            }

            tokio::select! {
                () = ctx.cancelled() => {
                    info!("reconcile loop cancelled");
                    return TickOutcome::Continue;
                }
                () = tokio::time::sleep(interval) => {}
            }
        }
    }
}

/// Runs a [`Nodelet`] on a background task.
pub struct Daemon {
    nodelet: Mutex<Option<Nodelet>>,
    outcome: Arc<Mutex<Option<TickOutcome>>>,
    shutdown_token: CancellationToken,
    task_tracker: TaskTracker,
}

impl Daemon {
    /// Wraps `nodelet`; the loop is cancelled through `shutdown_token`.
    #[must_use]
    pub fn new(nodelet: Nodelet, shutdown_token: CancellationToken) -> Self {
        Self {
            nodelet: Mutex::new(Some(nodelet)),
            outcome: Arc::new(Mutex::new(None)),
            shutdown_token,
            task_tracker: TaskTracker::new(),
        }
    }

    /// Spawns the reconcile loop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStarted`] if the loop was started before.
    pub fn start(&self) -> Result<()> {
        if self.task_tracker.is_closed() {
            return Err(Error::AlreadyStarted);
        }
        let Some(mut nodelet) = self.nodelet.lock().take() else {
            return Err(Error::AlreadyStarted);
        };

        let outcome = Arc::clone(&self.outcome);
        let shutdown_token = self.shutdown_token.clone();
        self.task_tracker.spawn(async move {
            let result = nodelet.run(&shutdown_token).await;
            *outcome.lock() = Some(result);
        });
        self.task_tracker.close();

        Ok(())
    }

    /// Waits for the loop to return and reports why it did.
    pub async fn wait(&self) -> TickOutcome {
        self.task_tracker.wait().await;
        self.outcome.lock().take().unwrap_or_default()
    }

    /// Cancels the loop and waits for it to return.
    pub async fn shutdown(&self) -> TickOutcome {
        info!("shutting down node agent");
        self.shutdown_token.cancel();
        self.task_tracker.close();
        self.wait().await
    }
}
