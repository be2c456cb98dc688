#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use nodelet::Nodelet;
use nodelet_config::{ClusterRole, Config, ServiceState};
use nodelet_phases::{Chain, Error, Operation, Phase, PhaseRecord, PhaseStatus, RecordCell, Result};
use nodelet_sunpike::{Conductor, Host};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Shared, ordered log of every phase call, as `"<op> <name>"`.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn snapshot(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock())
    }

    fn push(&self, operation: Operation, name: &str) {
        self.0.lock().push(format!("{operation} {name}"));
    }
}

/// Phase whose effect is a flag, with scripted start failures.
pub struct MockPhase {
    name: String,
    order: u32,
    record: RecordCell,
    log: CallLog,
    running: AtomicBool,
    start_failures: AtomicU32,
}

impl MockPhase {
    pub fn new(name: &str, order: u32, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            order,
            record: RecordCell::new(name, order),
            log: log.clone(),
            running: AtomicBool::new(false),
            start_failures: AtomicU32::new(0),
        }
    }

    /// The next `count` starts fail; `u32::MAX` fails forever.
    pub fn failing_starts(self, count: u32) -> Self {
        self.start_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn running(self) -> Self {
        self.running.store(true, Ordering::SeqCst);
        self
    }

    fn failed(&self, operation: Operation) -> Error {
        Error::PhaseFailed {
            name: self.name.clone(),
            operation,
            message: "scripted failure".to_string(),
        }
    }
}

#[async_trait]
impl Phase for MockPhase {
    fn name(&self) -> &str {
        &self.name
    }

    fn order(&self) -> u32 {
        self.order
    }

    fn record(&self) -> PhaseRecord {
        self.record.snapshot()
    }

    async fn start(&self, _ctx: &CancellationToken, _config: &Config) -> Result<()> {
        self.log.push(Operation::Start, &self.name);
        self.record.begin(Operation::Start);

        let remaining = self.start_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != u32::MAX {
                self.start_failures.store(remaining - 1, Ordering::SeqCst);
            }
            self.record.finish(PhaseStatus::Failed, "scripted failure");
            return Err(self.failed(Operation::Start));
        }

        self.running.store(true, Ordering::SeqCst);
        self.record.finish(PhaseStatus::Running, "");
        Ok(())
    }

    async fn stop(&self, _ctx: &CancellationToken, _config: &Config) -> Result<()> {
        self.log.push(Operation::Stop, &self.name);
        self.record.begin(Operation::Stop);
        self.running.store(false, Ordering::SeqCst);
        self.record.finish(PhaseStatus::Stopped, "");
        Ok(())
    }

    async fn status(&self, _ctx: &CancellationToken, _config: &Config) -> Result<()> {
        self.log.push(Operation::Status, &self.name);
        self.record.begin(Operation::Status);
        if self.running.load(Ordering::SeqCst) {
            self.record.finish(PhaseStatus::Running, "");
            Ok(())
        } else {
            self.record.finish(PhaseStatus::Failed, "not running");
            Err(self.failed(Operation::Status))
        }
    }
}

/// Running phase that cancels `token` when `trigger` is invoked, the way a
/// shutdown signal lands in the middle of an operation. Every operation
/// after that reports cancellation.
pub struct CancellingPhase {
    name: String,
    order: u32,
    record: RecordCell,
    log: CallLog,
    token: CancellationToken,
    trigger: Operation,
}

impl CancellingPhase {
    pub fn new(
        name: &str,
        order: u32,
        log: &CallLog,
        token: &CancellationToken,
        trigger: Operation,
    ) -> Self {
        Self {
            name: name.to_string(),
            order,
            record: RecordCell::new(name, order),
            log: log.clone(),
            token: token.clone(),
            trigger,
        }
    }

    fn run(&self, operation: Operation, done: PhaseStatus) -> Result<()> {
        self.log.push(operation, &self.name);
        if operation == self.trigger {
            self.token.cancel();
        }
        if self.token.is_cancelled() {
            return Err(Error::Cancelled(operation, self.name.clone()));
        }
        self.record.begin(operation);
        self.record.finish(done, "");
        Ok(())
    }
}

#[async_trait]
impl Phase for CancellingPhase {
    fn name(&self) -> &str {
        &self.name
    }

    fn order(&self) -> u32 {
        self.order
    }

    fn record(&self) -> PhaseRecord {
        self.record.snapshot()
    }

    async fn start(&self, _ctx: &CancellationToken, _config: &Config) -> Result<()> {
        self.run(Operation::Start, PhaseStatus::Running)
    }

    async fn stop(&self, _ctx: &CancellationToken, _config: &Config) -> Result<()> {
        self.run(Operation::Stop, PhaseStatus::Stopped)
    }

    async fn status(&self, _ctx: &CancellationToken, _config: &Config) -> Result<()> {
        self.run(Operation::Status, PhaseStatus::Running)
    }
}

/// A, B and C at orders 10, 20 and 30.
pub fn abc(log: &CallLog, b_start_failures: u32) -> Chain {
    vec![
        Arc::new(MockPhase::new("A", 10, log)),
        Arc::new(MockPhase::new("B", 20, log).failing_starts(b_start_failures)),
        Arc::new(MockPhase::new("C", 30, log)),
    ]
}

pub fn config(dir: &Path, desired: ServiceState) -> Config {
    Config {
        role: ClusterRole::Worker,
        cluster_id: "c1".to_string(),
        host_id: "host-1".to_string(),
        kube_service_state: desired,
        disable_sunpike: true,
        extension_output_file: dir.join("kube_status"),
        kube_env_path: dir.join("kube.env"),
        resmgr_kube_env_path: dir.join("kube_resmgr.env"),
        sunpike_kube_env_path: dir.join("kube_sunpike.env"),
        sunpike_config_path: dir.join("config_sunpike.yaml"),
        ..Config::default()
    }
}

/// An engine for a host that has never joined a cluster.
pub fn fresh_nodelet(config: Config, chain: Chain) -> Nodelet {
    let mut nodelet =
        Nodelet::new(config, chain, CancellationToken::new()).with_cert_phase_order(None);
    nodelet.state_mut().start_attempts = 0;
    nodelet
}

/// Conductor that answers every update with a fixed spec.
pub struct FixedConductor {
    pub reply: Host,
    pub updates: Arc<AtomicU32>,
}

#[async_trait]
impl Conductor for FixedConductor {
    async fn update_host_status(&mut self, host: &Host) -> nodelet_sunpike::Result<Host> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut reply = host.clone();
        reply.spec.clone_from(&self.reply.spec);
        Ok(reply)
    }
}
