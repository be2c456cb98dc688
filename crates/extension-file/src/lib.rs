//! The observed-state store: a JSON record of what the node agent last did,
//! shared with the host agent extension.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod data;
mod error;
mod file;

pub use data::{ExtensionData, FAILED_STATUS_CHECK_REAP_INTERVAL, NodeState, derive_node_state};
pub use error::{Error, Result};
pub use file::ExtensionFile;
