use crate::{Error, Result};

use nodelet_config::Config;
use tokio::process::Command;
use tracing::{info, warn};

/// Name of the cgroup status checks run in.
pub const STATUS_CGROUP: &str = "pf9-kube-status";

const CFS_PERIOD_US: u64 = 1_000_000;

/// CFS quota granting `cpu_limit` percent of one CPU per period.
///
/// # Errors
///
/// Returns [`Error::InvalidCpuLimit`] if the limit is outside `(0, 100]`.
pub fn cpu_quota_us(cpu_limit: f64) -> Result<u64> {
    if !(cpu_limit > 0.0 && cpu_limit <= 100.0) {
        return Err(Error::InvalidCpuLimit(cpu_limit));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let quota = (cpu_limit / 100.0 * CFS_PERIOD_US as f64) as u64;
    Ok(quota)
}

async fn run(label: &'static str, args: &[&str]) -> Result<()> {
    let output = Command::new("sudo")
        .args(args)
        .output()
        .await
        .map_err(|e| Error::Io("failed to run cgroup command", e))?;

    if !output.status.success() {
        return Err(Error::NonZeroExit(label, output.status));
    }

    Ok(())
}

/// Creates the status-check cgroup and applies the CPU limit.
///
/// # Errors
///
/// Returns an error if the limit is invalid or any cgroup command fails.
pub async fn create_status_cgroup(cpu_limit: f64) -> Result<()> {
    let quota = cpu_quota_us(cpu_limit)?;
    let group = format!("cpu:{STATUS_CGROUP}");
    let period = format!("cpu.cfs_period_us={CFS_PERIOD_US}");
    let quota = format!("cpu.cfs_quota_us={quota}");

    run(
        "cgcreate",
        &[
            "/usr/bin/cgcreate",
            "-a",
            "pf9:pf9group",
            "-t",
            "pf9:pf9group",
            "-g",
            &group,
        ],
    )
    .await?;
    run("cgset", &["/usr/bin/cgset", "-r", &period, STATUS_CGROUP]).await?;
    run("cgset", &["/usr/bin/cgset", "-r", &quota, STATUS_CGROUP]).await?;

    info!("status checks limited to {cpu_limit}% cpu");

    Ok(())
}

/// Sets up the status-check cgroup when enabled, disabling cgroups on failure.
pub async fn setup_cgroups(config: &mut Config) {
    if !config.cgroups_enabled() {
        return;
    }
    if let Err(e) = create_status_cgroup(config.cpu_limit).await {
        warn!("disabling cgroups: {e}");
        config.use_cgroups = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_quota() {
        assert_eq!(cpu_quota_us(40.0).unwrap(), 400_000);
        assert_eq!(cpu_quota_us(100.0).unwrap(), 1_000_000);
        assert!(matches!(cpu_quota_us(0.0), Err(Error::InvalidCpuLimit(_))));
        assert!(cpu_quota_us(100.5).is_err());
        assert!(cpu_quota_us(f64::NAN).is_err());
    }

    #[tokio::test]
    async fn test_invalid_limit_disables_cgroups() {
        let mut config = Config {
            cpu_limit: 0.0,
            ..Config::default()
        };

        setup_cgroups(&mut config).await;

        assert!(!config.use_cgroups);
    }

    #[tokio::test]
    async fn test_disabled_scripts_skip_setup() {
        let mut config = Config {
            cpu_limit: 0.0,
            disable_scripts: true,
            ..Config::default()
        };

        setup_cgroups(&mut config).await;

        assert!(config.use_cgroups);
    }
}
