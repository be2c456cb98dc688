//! The nodelet node agent: converges a single host into or out of a
//! Kubernetes cluster by driving its phase chain.
//!
//! [`Nodelet`] is the reconcile engine. Each tick sweeps the status checks,
//! starts or stops the chain towards the desired service state, persists the
//! observed state and exchanges it with the conductor. [`Daemon`] runs the
//! engine on a background task until it is cancelled or a configuration
//! update requires a restart.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod assets;
mod chain;
mod config_update;
mod daemon;
mod error;
mod nodelet;
mod reconcile;

pub use assets::{AssetBundle, DEFAULT_ASSET_BUNDLE};
pub use daemon::Daemon;
pub use error::{Error, Result, StepError};
pub use nodelet::{Nodelet, TickOutcome};
