use crate::Result;

use std::sync::Arc;

use nodelet_config::Config;
use nodelet_extension_file::{ExtensionData, ExtensionFile};
use nodelet_phases::{
    Chain, Operation, Phase, PhaseRecord, ScriptLauncher, init_and_load_role_phases, orders,
};
use nodelet_sunpike::{GrpcConductor, SunpikeReporter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What the daemon should do after a reconcile tick.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TickOutcome {
    /// Keep looping.
    #[default]
    Continue,

    /// New configuration was written; the process should exit so its
    /// supervisor restarts it with the new config.
    Restart,
}

/// The reconcile engine for one host.
///
/// Owns the configuration snapshot, the phase chain and the observed state.
/// Nothing here is shared: one tick runs at a time and at most one phase
/// executes within it.
pub struct Nodelet {
    pub(crate) config: Config,
    pub(crate) chain: Chain,
    pub(crate) state: ExtensionData,
    pub(crate) ext_file: ExtensionFile,
    pub(crate) reporter: Option<SunpikeReporter>,
    pub(crate) signal: CancellationToken,
    pub(crate) cert_phase_order: Option<u32>,
}

impl Nodelet {
    /// Creates an engine for `chain`.
    ///
    /// The persisted state is loaded unless the state file is disabled, then
    /// reset to a stopped service with nothing completed. `signal` is the
    /// process-level cancellation source; it alone can abort a bring-up.
    #[must_use]
    pub fn new(config: Config, chain: Chain, signal: CancellationToken) -> Self {
        let ext_file = ExtensionFile::new(&config.extension_output_file);

        let mut state = if config.disable_ext_file {
            ExtensionData::new()
        } else {
            ext_file.load().unwrap_or_else(|e| {
                warn!("failed to load {}: {e}", ext_file.path().display());
                ExtensionData::new()
            })
        };

        let names: Vec<String> = chain.iter().map(|p| p.name().to_string()).collect();
        state.completed_phases.clear();
        state.start_fail_step = None;
        state.all_status_checks.clone_from(&names);
        state.all_phases = names;
        state.operation = Operation::Stop;
        state.service_state = false;

        Self {
            config,
            chain,
            state,
            ext_file,
            reporter: None,
            signal,
            cert_phase_order: Some(orders::GEN_CERTS),
        }
    }

    /// Builds the engine for the configured role with script-backed phases.
    ///
    /// Reporting to the conductor is enabled unless disabled in `config`; if
    /// the reporter cannot be set up the engine runs without it.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain for the configured role is invalid.
    pub async fn from_config(mut config: Config, signal: CancellationToken) -> Result<Self> {
        let launcher = Arc::new(ScriptLauncher::default());
        let chain = init_and_load_role_phases(&mut config, &launcher).await?;
        let mut nodelet = Self::new(config, chain, signal);

        if nodelet.config.disable_sunpike {
            info!("conductor reporting is disabled");
        } else if nodelet.config.host_id.is_empty() {
            warn!("no host id configured, conductor reporting is disabled");
        } else {
            let conductor = GrpcConductor::from_config(&nodelet.config);
            match SunpikeReporter::new(Box::new(conductor), &nodelet.config, &nodelet.chain) {
                Ok(reporter) => nodelet.reporter = Some(reporter),
                Err(e) => warn!("conductor reporting is disabled: {e}"),
            }
        }

        Ok(nodelet)
    }

    /// Reports to the conductor through `reporter`.
    #[must_use]
    pub fn with_reporter(mut self, reporter: SunpikeReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Sets the order of the certificate phase that a restart preserves, or
    /// `None` to never preserve a phase.
    #[must_use]
    pub const fn with_cert_phase_order(mut self, order: Option<u32>) -> Self {
        self.cert_phase_order = order;
        self
    }

    /// Configuration snapshot.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The phase chain.
    #[must_use]
    pub fn chain(&self) -> &[Arc<dyn Phase>] {
        &self.chain
    }

    /// Observed state.
    #[must_use]
    pub const fn state(&self) -> &ExtensionData {
        &self.state
    }

    /// Observed state, for operator tooling that adjusts it between runs.
    pub const fn state_mut(&mut self) -> &mut ExtensionData {
        &mut self.state
    }

    /// Snapshots of every phase record, in chain order.
    #[must_use]
    pub fn list_phases(&self) -> Vec<PhaseRecord> {
        self.chain.iter().map(|p| p.record()).collect()
    }

    /// Makes the next stop preserve the certificate phase, as a restart does.
    pub const fn skip_gen_certs_phase(&mut self) {
        self.state.operation = Operation::Start;
        self.state.failed_status_check = -1;
    }

    /// Re-derives the node state and writes the state file.
    pub(crate) fn write_state(&mut self) {
        self.state
            .refresh(self.config.kube_service_state, self.config.full_retry_count);
        if self.config.disable_ext_file {
            return;
        }
        if let Err(e) = self.ext_file.write(&self.state) {
            error!("failed to write {}: {e}", self.ext_file.path().display());
        }
    }

    /// Writes the state file and reports to the conductor, ignoring the answer.
    ///
    /// Failures are logged and never interrupt the caller.
    pub(crate) async fn persist(&mut self) {
        self.write_state();
        if let Some(reporter) = &mut self.reporter {
            if let Err(e) = reporter.update(&self.state, &self.chain).await {
                warn!("failed to update conductor: {e}");
            } else {
                debug!("updated conductor");
            }
        }
    }
}
