use crate::conductor::Conductor;
use crate::host::env_map_to_host;
use crate::proto::{Host, HostPhase, HostStatus, NodeletStatus, ObjectMeta};
use crate::{Error, Result};

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nodelet_config::Config;
use nodelet_extension_file::ExtensionData;
use nodelet_phases::{Phase, PhaseRecord, PhaseStatus};
use tracing::debug;

/// Label carrying the hostname on the host object.
pub const HOSTNAME_LABEL: &str = "hostname";

fn clamp_i32<T: TryInto<i32>>(value: T) -> i32 {
    value.try_into().unwrap_or(i32::MAX)
}

fn host_phase(record: &PhaseRecord) -> HostPhase {
    HostPhase {
        name: record.name.clone(),
        order: clamp_i32(record.order),
        started_at: record.started_at.map_or(0, |t| t.timestamp()),
        operation: record.operation.to_string(),
        status: record.status.to_string(),
        message: record.message.clone(),
    }
}

/// Builds the host object reported before the first tick.
#[must_use]
pub fn initial_host(config: &Config, records: &[PhaseRecord], hostname: &str) -> Host {
    let phases: Vec<HostPhase> = records.iter().map(host_phase).collect();
    let all_status_checks = phases.iter().map(|p| p.order).collect();

    let mut labels = BTreeMap::new();
    labels.insert(HOSTNAME_LABEL.to_string(), hostname.to_string());

    Host {
        metadata: Some(ObjectMeta {
            name: config.host_id.clone(),
            labels,
        }),
        spec: env_map_to_host(&config.to_env_map()).spec,
        status: Some(HostStatus {
            cluster_role: config.role.to_string(),
            cluster_id: config.cluster_id.clone(),
            hostname: hostname.to_string(),
            nodelet: Some(NodeletStatus {
                version: env!("CARGO_PKG_VERSION").to_string(),
            }),
            phases,
            all_status_checks,
            phase_completed: -1,
            last_failed_phase: -1,
            current_phase: -1,
            last_failed_check: -1,
            current_status_check: -1,
            ..HostStatus::default()
        }),
    }
}

fn order_of(phases: &[HostPhase], name: &str) -> i32 {
    if name.is_empty() {
        return -1;
    }
    phases.iter().find(|p| p.name == name).map_or(-1, |p| p.order)
}

fn mark(phase: &mut HostPhase, operation: &str, status: PhaseStatus, now: i64) {
    operation.clone_into(&mut phase.operation);
    phase.status = status.to_string();
    phase.started_at = now;
}

fn mark_order(phases: &mut [HostPhase], order: i32, operation: &str, status: PhaseStatus, now: i64) {
    if let Some(phase) = phases.iter_mut().find(|p| p.order == order) {
        mark(phase, operation, status, now);
    }
}

/// Folds the observed state into the host status in place.
///
/// Phases up to the latest completed one are reported running and later
/// phases that have run are reported stopped. With nothing completed and
/// the service down, every phase is reported stopped. The phase in progress
/// and the last failed phase are marked last so they are never masked.
pub fn populate_host(
    host: &mut Host,
    data: &ExtensionData,
    records: &[PhaseRecord],
    now: DateTime<Utc>,
) {
    let now = now.timestamp();
    let status = host.status.get_or_insert_with(HostStatus::default);
    let operation = data.operation.as_str();

    for phase in &mut status.phases {
        if let Some(record) = records.iter().find(|r| clamp_i32(r.order) == phase.order) {
            phase.message.clone_from(&record.message);
        }
    }

    let current = order_of(&status.phases, &data.current_phase);
    let failed = order_of(&status.phases, &data.last_failed_phase);
    let completed = data
        .completed_phases
        .last()
        .map_or(-1, |name| order_of(&status.phases, name));

    status.start_attempts = clamp_i32(data.start_attempts);
    status.last_failed_check_time = data.last_failed_check_time;
    status.current_status_check_time = data.current_status_check_time;
    status.service_state = data.service_state;
    status.current_status_check = order_of(&status.phases, &data.current_status_check);
    status.last_failed_check = order_of(&status.phases, &data.last_failed_check);
    status.host_state = data.node_state.to_string();
    status.phase_completed = completed;
    status.current_phase = current;
    status.last_failed_phase = failed;

    if completed != -1 {
        for phase in &mut status.phases {
            if phase.order <= completed {
                mark(phase, operation, PhaseStatus::Running, now);
            } else if phase.status != PhaseStatus::NotStarted.as_str() {
                mark(phase, operation, PhaseStatus::Stopped, now);
            }
        }
    } else if !data.service_state && current == -1 {
        for phase in &mut status.phases {
            mark(phase, operation, PhaseStatus::Stopped, now);
        }
    }

    if current != -1 {
        mark_order(&mut status.phases, current, operation, PhaseStatus::Executing, now);
    }
    if failed != -1 {
        mark_order(&mut status.phases, failed, operation, PhaseStatus::Failed, now);
    }
}

/// Keeps the host object in sync with the observed state and exchanges it
/// with the conductor.
pub struct SunpikeReporter {
    conductor: Box<dyn Conductor>,
    host: Host,
}

impl SunpikeReporter {
    /// Creates a reporter for the local host.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Hostname`] if the hostname cannot be read.
    pub fn new(
        conductor: Box<dyn Conductor>,
        config: &Config,
        chain: &[Arc<dyn Phase>],
    ) -> Result<Self> {
        let hostname = nix::unistd::gethostname().map_err(Error::Hostname)?;
        let records: Vec<PhaseRecord> = chain.iter().map(|p| p.record()).collect();
        Ok(Self::with_host(
            conductor,
            initial_host(config, &records, &hostname.to_string_lossy()),
        ))
    }

    /// Creates a reporter around an already built host object.
    #[must_use]
    pub fn with_host(conductor: Box<dyn Conductor>, host: Host) -> Self {
        Self { conductor, host }
    }

    /// The host object as last reported.
    #[must_use]
    pub const fn host(&self) -> &Host {
        &self.host
    }

    /// Reports the observed state and returns the conductor's view of the host.
    ///
    /// # Errors
    ///
    /// Returns the conductor error once retries are exhausted.
    pub async fn update(&mut self, data: &ExtensionData, chain: &[Arc<dyn Phase>]) -> Result<Host> {
        let records: Vec<PhaseRecord> = chain.iter().map(|p| p.record()).collect();
        populate_host(&mut self.host, data, &records, Utc::now());
        debug!(
            "reporting host state {} to conductor",
            self.host.status.as_ref().map_or("", |s| s.host_state.as_str())
        );
        self.conductor.update_host_status(&self.host).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use nodelet_config::ClusterRole;
    use nodelet_extension_file::NodeState;
    use nodelet_phases::Operation;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    fn records() -> Vec<PhaseRecord> {
        vec![
            PhaseRecord::new("A", 10),
            PhaseRecord::new("B", 20),
            PhaseRecord::new("C", 30),
        ]
    }

    fn host() -> Host {
        let config = Config {
            host_id: "host-1".to_string(),
            role: ClusterRole::Worker,
            cluster_id: "c1".to_string(),
            ..Config::default()
        };
        initial_host(&config, &records(), "node-a")
    }

    fn statuses(host: &Host) -> Vec<String> {
        host.status
            .as_ref()
            .unwrap()
            .phases
            .iter()
            .map(|p| p.status.clone())
            .collect()
    }

    #[test]
    fn test_initial_host() {
        let host = host();
        let metadata = host.metadata.as_ref().unwrap();
        let status = host.status.as_ref().unwrap();

        assert_eq!(metadata.name, "host-1");
        assert_eq!(metadata.labels.get("hostname").map(String::as_str), Some("node-a"));
        assert_eq!(status.all_status_checks, vec![10, 20, 30]);
        assert_eq!(status.cluster_role, "worker");
        assert_eq!(status.phase_completed, -1);
        assert_eq!(status.last_failed_check, -1);
        assert_eq!(status.nodelet.as_ref().unwrap().version, env!("CARGO_PKG_VERSION"));
        assert_eq!(host.spec.as_ref().unwrap().pf9.as_ref().unwrap().cluster_id, "c1");
    }

    #[test]
    fn test_completed_phases_are_running() {
        let mut host = host();
        let data = ExtensionData {
            completed_phases: vec!["A".to_string(), "B".to_string()],
            operation: Operation::Start,
            node_state: NodeState::Retrying,
            start_attempts: 3,
            ..ExtensionData::new()
        };

        populate_host(&mut host, &data, &records(), Utc::now());

        assert_eq!(statuses(&host), vec!["running", "running", "not-started"]);
        let status = host.status.as_ref().unwrap();
        assert_eq!(status.phase_completed, 20);
        assert_eq!(status.host_state, "retrying");
        assert_eq!(status.start_attempts, 3);
    }

    #[test]
    fn test_current_and_failed_phases_are_marked() {
        let mut host = host();
        let data = ExtensionData {
            completed_phases: vec!["A".to_string()],
            current_phase: "B".to_string(),
            operation: Operation::Start,
            ..ExtensionData::new()
        };

        populate_host(&mut host, &data, &records(), Utc::now());
        assert_eq!(statuses(&host), vec!["running", "executing", "not-started"]);
        assert_eq!(host.status.as_ref().unwrap().current_phase, 20);

        let data = ExtensionData {
            completed_phases: vec!["A".to_string()],
            last_failed_phase: "B".to_string(),
            operation: Operation::Start,
            ..ExtensionData::new()
        };

        populate_host(&mut host, &data, &records(), Utc::now());
        assert_eq!(statuses(&host), vec!["running", "failed", "not-started"]);
        assert_eq!(host.status.as_ref().unwrap().last_failed_phase, 20);
    }

    #[test]
    fn test_phases_beyond_completed_that_ran_are_stopped() {
        let mut host = host();
        let running = ExtensionData {
            completed_phases: vec!["A".to_string(), "B".to_string(), "C".to_string()],
            service_state: true,
            ..ExtensionData::new()
        };
        populate_host(&mut host, &running, &records(), Utc::now());

        let partial = ExtensionData {
            completed_phases: vec!["A".to_string()],
            operation: Operation::Stop,
            ..ExtensionData::new()
        };
        populate_host(&mut host, &partial, &records(), Utc::now());

        assert_eq!(statuses(&host), vec!["running", "stopped", "stopped"]);
    }

    #[test]
    fn test_service_down_marks_everything_stopped() {
        let mut host = host();
        let data = ExtensionData {
            service_state: false,
            ..ExtensionData::new()
        };

        populate_host(&mut host, &data, &records(), Utc::now());

        assert_eq!(statuses(&host), vec!["stopped", "stopped", "stopped"]);
        assert_eq!(host.status.as_ref().unwrap().phase_completed, -1);
    }

    #[test]
    fn test_record_messages_are_carried() {
        let mut host = host();
        let mut records = records();
        records[1].message = "kubelet not ready".to_string();

        populate_host(&mut host, &ExtensionData::new(), &records, Utc::now());

        assert_eq!(host.status.as_ref().unwrap().phases[1].message, "kubelet not ready");
    }

    #[test]
    fn test_status_check_names_become_orders() {
        let mut host = host();
        let data = ExtensionData {
            current_status_check: "C".to_string(),
            last_failed_check: "B".to_string(),
            last_failed_check_time: 1_700,
            current_status_check_time: 1_800,
            ..ExtensionData::new()
        };

        populate_host(&mut host, &data, &records(), Utc::now());

        let status = host.status.as_ref().unwrap();
        assert_eq!(status.current_status_check, 30);
        assert_eq!(status.last_failed_check, 20);
        assert_eq!(status.last_failed_check_time, 1_700);
        assert_eq!(status.current_status_check_time, 1_800);
    }

    struct Echo(u32);

    #[async_trait]
    impl Conductor for Echo {
        async fn update_host_status(&mut self, host: &Host) -> Result<Host> {
            self.0 += 1;
            Ok(host.clone())
        }
    }

    #[tokio::test]
    async fn test_update_sends_populated_host() {
        let mut reporter = SunpikeReporter::with_host(Box::new(Echo(0)), host());
        let data = ExtensionData {
            node_state: NodeState::Ok,
            service_state: true,
            ..ExtensionData::new()
        };

        let returned = reporter.update(&data, &[]).await.unwrap();

        assert_eq!(returned.status.as_ref().unwrap().host_state, "ok");
        assert!(returned.status.as_ref().unwrap().service_state);
        assert_eq!(&returned, reporter.host());
    }
}
