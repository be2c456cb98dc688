use crate::nodelet::{Nodelet, TickOutcome};
use crate::{Error, Result};

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use nodelet_config::constants::GENERATED_FILE_HEADER;
use nodelet_config::read_yaml_file;
use nodelet_sunpike::{Host, host_to_env_map, is_empty_spec};
use tracing::{debug, info, warn};

/// Writes `body` to `path` behind the generated-file header.
pub(crate) fn write_generated(path: &Path, body: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| Error::Io("failed to create config directory", e))?;
    }
    fs::write(path, format!("{GENERATED_FILE_HEADER}\n{body}"))
        .map_err(|e| Error::Io("failed to write generated config", e))
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io("failed to remove file", e)),
    }
}

impl Nodelet {
    /// Writes the state file, reports to the conductor and applies the spec
    /// it returns.
    ///
    /// Remote errors are logged. With the conductor disabled, the local
    /// kube.env is regenerated from the last known conductor config instead.
    ///
    /// # Errors
    ///
    /// Returns an error if new configuration files cannot be written.
    pub async fn persist_and_update_config(&mut self) -> Result<TickOutcome> {
        self.write_state();

        if self.config.disable_sunpike {
            self.regenerate_resmgr_kube_env()?;
            return Ok(TickOutcome::Continue);
        }

        let Some(reporter) = &mut self.reporter else {
            return Ok(TickOutcome::Continue);
        };
        let result = reporter.update(&self.state, &self.chain).await;
        match result {
            Ok(host) => self.handle_config_update(&host),
            Err(e) => {
                warn!("failed to update conductor: {e}");
                Ok(TickOutcome::Continue)
            }
        }
    }

    /// Compares the spec returned by the conductor with the active one and
    /// writes it out if it differs.
    ///
    /// # Errors
    ///
    /// Returns an error if the new configuration cannot be written.
    pub fn handle_config_update(&self, host: &Host) -> Result<TickOutcome> {
        if self.config.disable_config_update {
            return Ok(TickOutcome::Continue);
        }
        if is_empty_spec(host.spec.as_ref()) {
            debug!("conductor returned an empty spec, ignoring");
            return Ok(TickOutcome::Continue);
        }

        let desired = host_to_env_map(host);
        let current = match read_yaml_file(&self.config.sunpike_config_path) {
            Ok(map) => Some(map),
            Err(e) => {
                warn!(
                    "failed to read {}: {e}",
                    self.config.sunpike_config_path.display()
                );
                None
            }
        };

        if self.config.sunpike_kube_env_path.exists() && current.as_ref() == Some(&desired) {
            return Ok(TickOutcome::Continue);
        }

        write_generated(&self.config.sunpike_kube_env_path, &desired.to_kube_env())?;
        write_generated(&self.config.sunpike_config_path, &desired.to_yaml()?)?;
        info!(
            "conductor config changed, wrote {} and {}",
            self.config.sunpike_kube_env_path.display(),
            self.config.sunpike_config_path.display()
        );

        if self.config.disable_exit_on_update {
            warn!("exit on config update is disabled, continuing with the old config");
            Ok(TickOutcome::Continue)
        } else {
            Ok(TickOutcome::Restart)
        }
    }

    fn regenerate_resmgr_kube_env(&self) -> Result<()> {
        let source = &self.config.sunpike_config_path;
        if !source.exists() {
            return Ok(());
        }

        let map = read_yaml_file(source)?;
        remove_if_exists(&self.config.resmgr_kube_env_path)?;
        write_generated(&self.config.resmgr_kube_env_path, &map.to_kube_env())
    }

    /// Points the canonical kube.env at the authoritative env file: the
    /// conductor-provided one when reporting is enabled and it exists, the
    /// local one otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the link cannot be replaced.
    pub fn set_kube_env_symlink(&self) -> Result<()> {
        let link = &self.config.kube_env_path;
        remove_if_exists(link)?;
        if let Some(parent) = link.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Io("failed to create kube.env directory", e))?;
        }

        let target = if !self.config.disable_sunpike && self.config.sunpike_kube_env_path.exists()
        {
            &self.config.sunpike_kube_env_path
        } else {
            &self.config.resmgr_kube_env_path
        };

        std::os::unix::fs::symlink(target, link)
            .map_err(|e| Error::Io("failed to create kube.env symlink", e))?;
        info!("{} now points at {}", link.display(), target.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use nodelet_config::{Config, EnvMap};
    use nodelet_phases::Chain;
    use nodelet_sunpike::env_map_to_host;
    use pretty_assertions::assert_eq;
    use tempfile::{TempDir, tempdir};
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;

    fn nodelet(dir: &TempDir) -> Nodelet {
        let config = Config {
            disable_ext_file: true,
            disable_sunpike: true,
            kube_env_path: dir.path().join("kube.env"),
            resmgr_kube_env_path: dir.path().join("kube_resmgr.env"),
            sunpike_kube_env_path: dir.path().join("kube_sunpike.env"),
            sunpike_config_path: dir.path().join("nodelet").join("config_sunpike.yaml"),
            ..Config::default()
        };
        Nodelet::new(config, Chain::new(), CancellationToken::new())
    }

    fn sample_host() -> Host {
        let map: EnvMap = [("HOSTID", "host-1"), ("ROLE", "worker"), ("CLUSTER_ID", "c1")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        env_map_to_host(&map)
    }

    #[test]
    fn test_empty_spec_is_ignored() {
        let dir = tempdir().unwrap();
        let nodelet = nodelet(&dir);

        let outcome = nodelet.handle_config_update(&Host::default()).unwrap();

        assert_eq!(outcome, TickOutcome::Continue);
        assert!(!nodelet.config.sunpike_kube_env_path.exists());
    }

    #[test]
    fn test_disabled_config_update_is_ignored() {
        let dir = tempdir().unwrap();
        let mut nodelet = nodelet(&dir);
        nodelet.config.disable_config_update = true;

        let outcome = nodelet.handle_config_update(&sample_host()).unwrap();

        assert_eq!(outcome, TickOutcome::Continue);
        assert!(!nodelet.config.sunpike_config_path.exists());
    }

    #[test]
    fn test_generated_files_carry_header() {
        let dir = tempdir().unwrap();
        let nodelet = nodelet(&dir);

        nodelet.handle_config_update(&sample_host()).unwrap();

        let kube_env = fs::read_to_string(&nodelet.config.sunpike_kube_env_path).unwrap();
        let yaml = fs::read_to_string(&nodelet.config.sunpike_config_path).unwrap();
        assert!(kube_env.starts_with(GENERATED_FILE_HEADER));
        assert!(kube_env.contains("export ROLE=\"worker\""));
        assert!(yaml.starts_with(GENERATED_FILE_HEADER));
        assert_eq!(
            read_yaml_file(&nodelet.config.sunpike_config_path).unwrap(),
            host_to_env_map(&sample_host())
        );
    }

    #[test]
    #[traced_test]
    fn test_symlink_prefers_local_env_when_conductor_disabled() {
        let dir = tempdir().unwrap();
        let nodelet = nodelet(&dir);
        fs::write(&nodelet.config.sunpike_kube_env_path, "").unwrap();
        fs::write(&nodelet.config.kube_env_path, "stale").unwrap();

        nodelet.set_kube_env_symlink().unwrap();

        assert_eq!(
            fs::read_link(&nodelet.config.kube_env_path).unwrap(),
            nodelet.config.resmgr_kube_env_path
        );
        assert!(logs_contain("now points at"));
    }

    #[test]
    fn test_symlink_prefers_conductor_env_when_present() {
        let dir = tempdir().unwrap();
        let mut nodelet = nodelet(&dir);
        nodelet.config.disable_sunpike = false;
        fs::write(&nodelet.config.sunpike_kube_env_path, "").unwrap();

        nodelet.set_kube_env_symlink().unwrap();
        nodelet.set_kube_env_symlink().unwrap();

        assert_eq!(
            fs::read_link(&nodelet.config.kube_env_path).unwrap(),
            nodelet.config.sunpike_kube_env_path
        );
    }

    #[tokio::test]
    async fn test_local_env_regenerated_from_conductor_snapshot() {
        let dir = tempdir().unwrap();
        let mut nodelet = nodelet(&dir);
        let map = host_to_env_map(&sample_host());
        write_generated(&nodelet.config.sunpike_config_path, &map.to_yaml().unwrap()).unwrap();
        fs::write(&nodelet.config.resmgr_kube_env_path, "export OLD=\"1\"\n").unwrap();

        let outcome = nodelet.persist_and_update_config().await.unwrap();

        assert_eq!(outcome, TickOutcome::Continue);
        let contents = fs::read_to_string(&nodelet.config.resmgr_kube_env_path).unwrap();
        assert!(!contents.contains("OLD"));
        assert_eq!(EnvMap::from_kube_env(&contents).unwrap(), map);
    }
}
