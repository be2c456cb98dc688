//! Phases: the ordered, reversible steps that bring a host into or out of a
//! Kubernetes cluster.
//!
//! Every phase implements [`Phase`]. The registry hands out one immutable
//! chain per cluster role; the shipped phases are all backed by shell scripts
//! run through [`ScriptPhase`].
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod cgroups;
mod error;
mod phase;
mod record;
mod registry;
mod script;

pub use cgroups::{STATUS_CGROUP, cpu_quota_us, create_status_cgroup, setup_cgroups};
pub use error::{Error, Result};
pub use phase::Phase;
pub use record::{Operation, PhaseRecord, PhaseStatus, RecordCell};
pub use registry::{
    Chain, init_and_load_role_phases, orders, phases_for_role, script_file,
    validate_phase_ordering,
};
pub use script::{
    CGROUP_PREFIX, SCRIPT_WRAPPER, ScriptLauncher, ScriptPhase, prune_and_log_output,
};
