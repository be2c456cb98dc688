use crate::{PhaseRecord, Result};

use async_trait::async_trait;
use nodelet_config::Config;
use tokio_util::sync::CancellationToken;

/// A reversible, idempotent step of bringing a host into a cluster.
///
/// `start` on a running phase and `stop` on a stopped phase must succeed.
/// `status` succeeds iff the phase's effect is currently in place; its failure
/// is informational and only steers the reconcile engine.
#[async_trait]
pub trait Phase: Send + Sync + 'static {
    /// Human readable name, stable across restarts.
    fn name(&self) -> &str;

    /// Strictly positive position within the chain.
    fn order(&self) -> u32;

    /// Snapshot of the phase's observed record.
    fn record(&self) -> PhaseRecord;

    /// Brings the effect into place.
    async fn start(&self, ctx: &CancellationToken, config: &Config) -> Result<()>;

    /// Removes the effect.
    async fn stop(&self, ctx: &CancellationToken, config: &Config) -> Result<()>;

    /// Checks whether the effect is in place.
    async fn status(&self, ctx: &CancellationToken, config: &Config) -> Result<()>;
}
