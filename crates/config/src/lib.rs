//! Configuration for the nodelet node agent.
//!
//! Configuration is a flat set of uppercase keys. It is read from YAML files,
//! overlaid with command-line values, and handed to phase scripts as a
//! shell-sourceable kube.env file. [`EnvMap`] is the common currency between
//! all of these representations.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod config;
pub mod constants;
mod env_map;
mod error;
mod loader;
mod types;

pub use config::{Config, ConfigValue, KNOWN_KEYS};
pub use env_map::{EnvMap, parse_bool};
pub use error::{Error, Result};
pub use loader::{ConfigOverrides, load, read_config_dir, read_yaml_file};
pub use types::{ClusterRole, ServiceState};
