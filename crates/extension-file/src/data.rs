use std::fmt;

use chrono::{DateTime, Utc};
use nodelet_config::ServiceState;
use nodelet_phases::Operation;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Seconds after which a recorded status-check failure is forgotten.
pub const FAILED_STATUS_CHECK_REAP_INTERVAL: i64 = 600;

/// Convergence summary reported for the host.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum NodeState {
    /// Observed state matches the desired one.
    Ok,

    /// First attempt at reaching the desired state.
    #[default]
    Converging,

    /// Repeated attempts, still within the retry limit.
    Retrying,

    /// Retry limit exhausted.
    Failed,
}

impl NodeState {
    /// Label used in the state file and in reports.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Converging => "converging",
            Self::Retrying => "retrying",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for NodeState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "ok" => Self::Ok,
            "converging" | "" => Self::Converging,
            "retrying" => Self::Retrying,
            _ => Self::Failed,
        }
    }
}

impl From<NodeState> for String {
    fn from(value: NodeState) -> Self {
        value.as_str().to_string()
    }
}

/// Derives the node state from the desired state and what the last status
/// sweep observed.
///
/// A desired state of `ignore` keeps `current`, and so does a mismatch with
/// no pending start attempt.
#[must_use]
pub const fn derive_node_state(
    desired: ServiceState,
    kube_running: bool,
    start_attempts: u32,
    full_retry_count: u32,
    current: NodeState,
) -> NodeState {
    let matches = match desired {
        ServiceState::True => kube_running,
        ServiceState::False => !kube_running,
        ServiceState::Ignore => return current,
    };
    if matches {
        return NodeState::Ok;
    }
    match start_attempts {
        0 => current,
        1 => NodeState::Converging,
        n if n <= full_retry_count => NodeState::Retrying,
        _ => NodeState::Failed,
    }
}

/// The persisted record of what the agent last observed and did.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct ExtensionData {
    /// Whether the host was last brought into the cluster successfully.
    #[serde(rename = "pf9_kube_service_state", with = "bool_string")]
    pub service_state: bool,

    /// Derived convergence summary.
    #[serde(rename = "pf9_kube_node_state")]
    pub node_state: NodeState,

    /// Consecutive start attempts since the last success.
    #[serde(rename = "pf9_kube_start_attempt")]
    pub start_attempts: u32,

    /// Cluster this host has joined.
    #[serde(rename = "pf9_cluster_id")]
    pub cluster_id: String,

    /// Role this host has joined with.
    #[serde(rename = "pf9_cluster_role")]
    pub cluster_role: String,

    /// Names of every status check, in chain order.
    #[serde(rename = "all_status_checks")]
    pub all_status_checks: Vec<String>,

    /// Names of every phase, in chain order.
    #[serde(rename = "all_tasks")]
    pub all_phases: Vec<String>,

    /// Phases started successfully in the current attempt.
    #[serde(rename = "completed_tasks")]
    pub completed_phases: Vec<String>,

    /// Status check in progress, or empty.
    #[serde(rename = "current_status_check")]
    pub current_status_check: String,

    /// Phase in progress, or empty.
    #[serde(rename = "current_task")]
    pub current_phase: String,

    /// Last status check that failed.
    #[serde(rename = "last_failed_status_check")]
    pub last_failed_check: String,

    /// UNIX time of the last status check failure.
    #[serde(rename = "last_failed_status_time")]
    pub last_failed_check_time: i64,

    /// Last phase whose start failed.
    #[serde(rename = "last_failed_task")]
    pub last_failed_phase: String,

    /// UNIX time of the latest status sweep.
    #[serde(rename = "status_check_timestamp")]
    pub current_status_check_time: i64,

    /// Operation currently driving the chain.
    #[serde(skip)]
    pub operation: Operation,

    /// Result of the most recent status sweep.
    #[serde(skip)]
    pub kube_running: bool,

    /// Index of the phase whose status check failed last, 0 if none and -1
    /// when no phase should be treated as failed.
    #[serde(skip)]
    pub failed_status_check: i64,

    /// When every status check last passed.
    #[serde(skip)]
    pub last_successful_status: Option<DateTime<Utc>>,

    /// Index of the phase whose start failed last.
    #[serde(skip)]
    pub start_fail_step: Option<usize>,
}

impl Default for ExtensionData {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtensionData {
    /// A fresh record: converging on the first attempt.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            service_state: false,
            node_state: NodeState::Converging,
            start_attempts: 1,
            cluster_id: String::new(),
            cluster_role: String::new(),
            all_status_checks: Vec::new(),
            all_phases: Vec::new(),
            completed_phases: Vec::new(),
            current_status_check: String::new(),
            current_phase: String::new(),
            last_failed_check: String::new(),
            last_failed_check_time: 0,
            last_failed_phase: String::new(),
            current_status_check_time: 0,
            operation: Operation::Stop,
            kube_running: false,
            failed_status_check: 0,
            last_successful_status: None,
            start_fail_step: None,
        }
    }

    /// Reaps stale status-check failures and re-derives the node state.
    pub fn refresh(&mut self, desired: ServiceState, full_retry_count: u32) {
        if self.current_status_check_time - self.last_failed_check_time
            >= FAILED_STATUS_CHECK_REAP_INTERVAL
        {
            self.last_failed_check_time = 0;
            self.last_failed_check = String::new();
        }
        self.node_state = derive_node_state(
            desired,
            self.kube_running,
            self.start_attempts,
            full_retry_count,
            self.node_state,
        );
    }

    /// Resets a persisted `ok` so a restarted agent reports convergence
    /// until its first tick.
    pub const fn reset_after_load(&mut self) {
        if matches!(self.node_state, NodeState::Ok) {
            self.node_state = NodeState::Converging;
            self.start_attempts = 1;
        }
    }
}

mod bool_string {
    use super::{Deserialize, Deserializer, Serializer};

    use nodelet_config::parse_bool;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        String(String),
    }

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "true" } else { "false" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Bool(value) => value,
            Raw::String(value) => parse_bool(&value).unwrap_or(false),
        })
    }
}
