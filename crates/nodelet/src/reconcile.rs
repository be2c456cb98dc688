use crate::nodelet::{Nodelet, TickOutcome};

use chrono::Utc;
use nodelet_config::{ClusterRole, ServiceState};
use nodelet_phases::{Operation, PhaseRecord};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

impl Nodelet {
    /// Runs one reconcile tick: status sweep, bring-up or tear-down, then
    /// persist and report.
    ///
    /// Errors never escape a tick; they are logged and the next tick
    /// re-evaluates.
    pub async fn reconcile(&mut self, ctx: &CancellationToken) -> TickOutcome {
        self.status(ctx).await;
        if self.shutting_down(ctx) {
            info!("shutdown requested, skipping the rest of the tick");
            return TickOutcome::Continue;
        }

        match self.config.kube_service_state {
            ServiceState::True => self.handle_start_state(ctx).await,
            ServiceState::False => self.handle_stop_state(ctx).await,
            ServiceState::Ignore => {}
        }

        match self.persist_and_update_config().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("failed to apply configuration update: {e}");
                TickOutcome::Continue
            }
        }
    }

    fn shutting_down(&self, ctx: &CancellationToken) -> bool {
        ctx.is_cancelled() || self.signal.is_cancelled()
    }

    /// Sweeps the status checks in chain order and returns whether the
    /// service is considered running.
    ///
    /// The sweep is skipped after a failed start, leaving the failed step as
    /// the stop floor. A failure within the configured tolerance window after
    /// the last fully successful sweep is reported as running. A cancelled
    /// check ends the sweep without recording a failure and keeps the
    /// previous result.
    pub async fn status(&mut self, ctx: &CancellationToken) -> bool {
        let now = Utc::now();
        let was_running = self.state.kube_running;
        self.state.current_status_check_time = now.timestamp();
        self.state.operation = Operation::Status;
        self.state.kube_running = false;

        if let Some(step) = self.state.start_fail_step {
            info!("skipping status checks, start failed at phase {step}");
            self.state.current_status_check.clear();
            self.persist().await;
            self.state.failed_status_check = i64::try_from(step).unwrap_or(0);
            return false;
        }

        let chain = self.chain.clone();
        let mut failed_at = None;
        let mut interrupted = false;
        for (index, phase) in chain.iter().enumerate() {
            if self.config.disable_scripts {
                break;
            }
            let name = phase.name().to_string();
            self.state.current_status_check.clone_from(&name);
            self.persist().await;

            if let Err(e) = phase.status(ctx, &self.config).await {
                if e.is_cancelled() {
                    info!("status sweep interrupted at phase {name}");
                    interrupted = true;
                    break;
                }
                info!("status check of phase {name} failed: {e}");
                self.state.last_failed_check = name;
                self.state.last_failed_check_time = now.timestamp();
                failed_at = Some(index);
                break;
            }
        }

        self.state.current_status_check.clear();
        if interrupted {
            self.state.kube_running = was_running;
            self.persist().await;
            return was_running;
        }
        self.persist().await;

        let mut failed_status_check = 0;
        match failed_at {
            None => {
                self.state.kube_running = true;
                self.state.last_successful_status = Some(now);
            }
            Some(index) if self.config.kube_service_state == ServiceState::True => {
                let threshold = i64::try_from(self.config.status_threshold_seconds)
                    .unwrap_or(i64::MAX);
                let delta = self
                    .state
                    .last_successful_status
                    .map_or(i64::MAX, |last| (now - last).num_seconds());

                if delta < threshold {
                    warn!(
                        "status check failed {delta}s after the last success, within the \
                         {threshold}s threshold; treating the service as running"
                    );
                    self.state.kube_running = true;
                } else {
                    if threshold != 0 {
                        warn!("status check failing for more than {threshold}s");
                    }
                    failed_status_check = i64::try_from(index).unwrap_or(0);
                }
            }
            Some(_) => {
                // Failing checks are expected while the service is meant to be down.
                self.state.last_successful_status = Some(now);
            }
        }
        self.state.failed_status_check = failed_status_check;

        self.state.kube_running
    }

    fn joined_desired_cluster(&self) -> bool {
        let state = &self.state;
        (state.cluster_id == self.config.cluster_id
            && state.cluster_role == self.config.role.as_str())
            || (state.cluster_role == ClusterRole::None.as_str() && state.cluster_id.is_empty())
    }

    /// Bring-up branch of a tick.
    pub(crate) async fn handle_start_state(&mut self, ctx: &CancellationToken) {
        if self.config.disable_scripts {
            warn!("phase scripts are disabled, not starting the service");
            return;
        }
        self.state.operation = Operation::Start;

        if self.state.kube_running && self.joined_desired_cluster() {
            self.state.start_attempts = 0;
            self.state.service_state = true;
            self.state.start_fail_step = None;
            self.state.completed_phases.clone_from(&self.state.all_phases);
        } else {
            let previous_attempts = self.state.start_attempts;
            self.state.start_attempts = previous_attempts.saturating_add(1);
            let attempts = self.state.start_attempts;
            let floor = if attempts % self.config.full_retry_count.max(1) == 0 {
                info!("start attempt {attempts}, restarting the whole chain");
                0
            } else {
                usize::try_from(self.state.failed_status_check).unwrap_or(0)
            };

            // The cleanup stop keeps the attempt count so retries escalate.
            if let Err(e) = self.stop_phases(ctx, floor, false, false).await {
                warn!("cleanup before start failed: {e}");
            }
            self.state.cluster_id.clone_from(&self.config.cluster_id);
            self.state.cluster_role = self.config.role.to_string();

            let signal = self.signal.clone();
            match self.start_chain(&signal, floor).await {
                Ok(()) => {
                    info!("service started after {attempts} attempt(s)");
                    self.state.start_attempts = 0;
                    self.state.service_state = true;
                    self.state.last_failed_phase.clear();
                    self.state.start_fail_step = None;
                }
                Err(e) if e.is_cancelled() => {
                    info!("start attempt {attempts} interrupted by shutdown at phase {}", e.name);
                    self.state.start_attempts = previous_attempts;
                }
                Err(e) => {
                    error!("start attempt {attempts} failed: {e}");
                    self.state.service_state = false;
                    self.state.start_fail_step = Some(e.index);
                }
            }
        }

        self.persist().await;
    }

    /// Tear-down branch of a tick.
    pub(crate) async fn handle_stop_state(&mut self, ctx: &CancellationToken) {
        self.state.operation = Operation::Stop;
        if self.config.disable_scripts {
            return;
        }

        if !self.state.kube_running {
            info!("service is already stopped");
        } else {
            if let Err(e) = self.stop_chain(ctx, 0, false).await {
                warn!("failed to stop service: {e}");
            }
            self.state.start_fail_step = None;
        }

        self.persist().await;
    }

    /// Runs the status check of one phase, or of every phase, and returns
    /// the resulting records.
    ///
    /// Unlike a sweep, a failing phase does not stop the remaining checks.
    pub async fn phases_status(
        &mut self,
        ctx: &CancellationToken,
        index: Option<usize>,
    ) -> Vec<PhaseRecord> {
        let chain = self.chain.clone();
        let mut records = Vec::new();

        for (i, phase) in chain.iter().enumerate() {
            if index.is_some_and(|wanted| wanted != i) {
                continue;
            }
            if let Err(e) = phase.status(ctx, &self.config).await {
                info!("status check of phase {} failed: {e}", phase.name());
            }
            records.push(phase.record());
        }

        records
    }
}
