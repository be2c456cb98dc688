use crate::error::StepError;
use crate::nodelet::Nodelet;
use crate::{Error, Result};

use std::sync::Arc;

use nodelet_phases::{Error as PhaseError, Operation, Phase, PhaseStatus};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

impl Nodelet {
    fn phase_names(&self, count: usize) -> Vec<String> {
        self.chain
            .iter()
            .take(count)
            .map(|p| p.name().to_string())
            .collect()
    }

    fn phase_at(&self, index: usize) -> Result<Arc<dyn Phase>> {
        self.chain
            .get(index)
            .cloned()
            .ok_or(Error::InvalidPhaseIndex(index, self.chain.len()))
    }

    // A stop that precedes a restart keeps the certificates unless their
    // phase is the one whose status check failed.
    fn preserves_phase(&self, index: usize, order: u32) -> bool {
        self.state.operation == Operation::Start
            && self.cert_phase_order == Some(order)
            && i64::try_from(index).ok() != Some(self.state.failed_status_check)
    }

    /// Starts every phase from `from` to the end of the chain, in order.
    ///
    /// Progress is persisted before and after each phase. The walk stops at
    /// the first failing phase. A running phase is never interrupted;
    /// cancelling `ctx` stops the walk before the next phase.
    ///
    /// # Errors
    ///
    /// Returns the failing phase as a [`StepError`], or the phase that was
    /// about to start when `ctx` was cancelled.
    pub async fn start_chain(
        &mut self,
        ctx: &CancellationToken,
        from: usize,
    ) -> std::result::Result<(), StepError> {
        let chain = self.chain.clone();
        let from = from.min(chain.len());
        self.state.completed_phases = self.phase_names(from);

        for (index, phase) in chain.iter().enumerate().skip(from) {
            let name = phase.name().to_string();
            if ctx.is_cancelled() {
                info!("start interrupted before phase {index} ({name})");
                self.state.current_phase.clear();
                self.persist().await;
                return Err(StepError {
                    index,
                    source: PhaseError::Cancelled(Operation::Start, name.clone()),
                    name,
                    operation: Operation::Start,
                });
            }

            self.state.current_phase.clone_from(&name);
            self.persist().await;

            info!("starting phase {index} ({name})");
            if let Err(source) = phase.start(ctx, &self.config).await {
                if source.is_cancelled() {
                    info!("start of phase {name} was cancelled");
                    self.state.current_phase.clear();
                } else {
                    error!("failed to start phase {name}: {source}");
                    self.state.last_failed_phase.clone_from(&name);
                }
                self.persist().await;
                return Err(StepError {
                    index,
                    name,
                    operation: Operation::Start,
                    source,
                });
            }

            self.state.completed_phases.push(name);
            self.persist().await;
        }

        self.state.current_phase.clear();
        self.persist().await;
        Ok(())
    }

    /// Stops phases from the end of the chain down to `to`, in reverse order.
    ///
    /// Without `force` the walk stops at the first failing phase; with it
    /// every remaining phase is attempted. Stopping down to index 0 also
    /// forgets the joined cluster.
    ///
    /// # Errors
    ///
    /// Returns the last failing phase as a [`StepError`].
    pub async fn stop_chain(
        &mut self,
        ctx: &CancellationToken,
        to: usize,
        force: bool,
    ) -> std::result::Result<(), StepError> {
        self.stop_phases(ctx, to, force, true).await
    }

    /// Stops down to `to` like [`Nodelet::stop_chain`], optionally keeping
    /// the start attempt counter on a full stop.
    pub(crate) async fn stop_phases(
        &mut self,
        ctx: &CancellationToken,
        to: usize,
        force: bool,
        reset_attempts: bool,
    ) -> std::result::Result<(), StepError> {
        let chain = self.chain.clone();
        let to = to.min(chain.len());
        let mut last_error = None;

        for (index, phase) in chain.iter().enumerate().skip(to).rev() {
            let name = phase.name().to_string();
            if self.preserves_phase(index, phase.order()) {
                info!("skipping phase {name} to preserve certificates");
                continue;
            }

            info!("stopping phase {index} ({name})");
            if let Err(source) = phase.stop(ctx, &self.config).await {
                error!("failed to stop phase {name}: {source}");
                last_error = Some(StepError {
                    index,
                    name,
                    operation: Operation::Stop,
                    source,
                });
                if !force {
                    break;
                }
            }
        }

        self.state.service_state = false;
        self.state.completed_phases = self.phase_names(to);
        if to == 0 {
            if reset_attempts {
                self.state.start_attempts = 0;
            }
            self.state.completed_phases.clear();
            self.state.cluster_id.clear();
            self.state.cluster_role.clear();
            self.state.current_phase.clear();
            self.state.last_failed_phase.clear();
        }
        self.persist().await;

        last_error.map_or(Ok(()), Err)
    }

    /// Starts the single phase at `index`.
    ///
    /// Completed phases are left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the index is out of range, the phase fails, or
    /// the phase does not report `running` afterwards.
    pub async fn start_single(&mut self, ctx: &CancellationToken, index: usize) -> Result<()> {
        let phase = self.phase_at(index)?;
        let name = phase.name().to_string();

        self.state.current_phase.clone_from(&name);
        self.persist().await;
        let result = phase.start(ctx, &self.config).await;
        self.state.current_phase.clear();
        if result.is_err() {
            self.state.last_failed_phase.clone_from(&name);
        }
        self.persist().await;
        result?;

        expect_status(&*phase, PhaseStatus::Running)
    }

    /// Stops the single phase at `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the index is out of range, the phase fails, or
    /// the phase does not report `stopped` afterwards.
    pub async fn stop_single(&mut self, ctx: &CancellationToken, index: usize) -> Result<()> {
        let phase = self.phase_at(index)?;

        let result = phase.stop(ctx, &self.config).await;
        self.persist().await;
        result?;

        expect_status(&*phase, PhaseStatus::Stopped)
    }
}

fn expect_status(phase: &dyn Phase, expected: PhaseStatus) -> Result<()> {
    let actual = phase.record().status;
    if actual == expected {
        Ok(())
    } else {
        Err(Error::PhaseStatus {
            name: phase.name().to_string(),
            expected,
            actual,
        })
    }
}
