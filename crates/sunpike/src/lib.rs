//! Client side of the conductor ("sunpike") API.
//!
//! The node agent reports its observed state as a [`Host`] after every
//! change and receives the desired host spec in return. [`SunpikeReporter`]
//! owns the host object, [`GrpcConductor`] carries it over gRPC, and the
//! [`host_to_env_map`] / [`env_map_to_host`] pair translates the spec to and
//! from the flat configuration view.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod client;
mod conductor;
mod error;
mod host;
pub mod proto;
mod reporter;

pub use client::ConductorClient;
pub use conductor::{Conductor, GrpcConductor, RetryPolicy, call_with_retry};
pub use error::{Error, Result};
pub use host::{MIRRORED_KEYS, env_map_to_host, host_to_env_map, is_empty_spec};
pub use proto::{Host, HostSpec};
pub use reporter::{HOSTNAME_LABEL, SunpikeReporter, initial_host, populate_host};
