use systemctl::SystemCtl;
use tracing::debug;

/// Units that manage this host and must not run alongside manual phase
/// commands.
pub const AGENT_UNITS: [&str; 2] = ["pf9-nodeletd", "pf9-hostagent"];

/// Whether any of the host agents is active.
///
/// A unit whose state cannot be queried counts as inactive.
pub fn agents_running() -> bool {
    let systemctl = SystemCtl::default();

    AGENT_UNITS.iter().any(|unit| match systemctl.is_active(unit) {
        Ok(active) => active,
        Err(e) => {
            debug!("failed to query {unit}: {e}");
            false
        }
    })
}
