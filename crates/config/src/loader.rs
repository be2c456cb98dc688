use crate::config::Config;
use crate::env_map::EnvMap;
use crate::types::{ClusterRole, ServiceState};
use crate::{Error, Result};

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Command-line values layered on top of the file configuration.
///
/// `None` and `false` leave the file value untouched, so a flag can only ever
/// switch a feature off or set an explicit value.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Force debug logging.
    pub debug: bool,

    /// Phase scripts directory.
    pub phase_scripts_dir: Option<PathBuf>,

    /// State file path.
    pub extension_output_file: Option<PathBuf>,

    /// kube.env symlink path.
    pub kube_env_path: Option<PathBuf>,

    /// Conductor kube.env path.
    pub sunpike_kube_env_path: Option<PathBuf>,

    /// Conductor YAML snapshot path.
    pub sunpike_config_path: Option<PathBuf>,

    /// Reconcile interval in seconds.
    pub loop_interval: Option<u64>,

    /// Host id.
    pub host_id: Option<String>,

    /// Cluster id.
    pub cluster_id: Option<String>,

    /// Cluster role.
    pub role: Option<ClusterRole>,

    /// Desired service state.
    pub kube_service_state: Option<ServiceState>,

    /// Status tolerance window in seconds.
    pub status_threshold_seconds: Option<u64>,

    /// Script retry attempts.
    pub phase_retry: Option<u32>,

    /// Run one tick and exit.
    pub disable_loop: bool,

    /// Never talk to the conductor.
    pub disable_sunpike: bool,

    /// Never touch the state file.
    pub disable_ext_file: bool,

    /// Never run scripts.
    pub disable_scripts: bool,

    /// Never apply conductor config.
    pub disable_config_update: bool,
}

impl ConfigOverrides {
    /// Applies the overrides to `config`.
    pub fn apply(&self, config: &mut Config) {
        if self.debug {
            config.debug = true;
        }
        if let Some(dir) = &self.phase_scripts_dir {
            config.phase_scripts_dir.clone_from(dir);
        }
        if let Some(path) = &self.extension_output_file {
            config.extension_output_file.clone_from(path);
        }
        if let Some(path) = &self.kube_env_path {
            config.kube_env_path.clone_from(path);
        }
        if let Some(path) = &self.sunpike_kube_env_path {
            config.sunpike_kube_env_path.clone_from(path);
        }
        if let Some(path) = &self.sunpike_config_path {
            config.sunpike_config_path.clone_from(path);
        }
        if let Some(interval) = self.loop_interval {
            config.loop_interval = interval;
        }
        if let Some(host_id) = &self.host_id {
            config.host_id.clone_from(host_id);
        }
        if let Some(cluster_id) = &self.cluster_id {
            config.cluster_id.clone_from(cluster_id);
        }
        if let Some(role) = self.role {
            config.role = role;
        }
        if let Some(state) = self.kube_service_state {
            config.kube_service_state = state;
        }
        if let Some(threshold) = self.status_threshold_seconds {
            config.status_threshold_seconds = threshold;
        }
        if let Some(retry) = self.phase_retry {
            config.phase_retry = retry;
        }
        config.disable_loop |= self.disable_loop;
        config.disable_sunpike |= self.disable_sunpike;
        config.disable_ext_file |= self.disable_ext_file;
        config.disable_scripts |= self.disable_scripts;
        config.disable_config_update |= self.disable_config_update;
    }
}

/// Reads a YAML file into an [`EnvMap`].
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a YAML mapping.
pub fn read_yaml_file(path: &Path) -> Result<EnvMap> {
    let contents =
        fs::read_to_string(path).map_err(|e| Error::Io("failed to read config file", e))?;
    EnvMap::from_yaml(&contents)
}

/// Merges every `.yaml`/`.yml` file of `dir` in file-name order.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed, a file fails to
/// parse, or no YAML file is present.
pub fn read_config_dir(dir: &Path) -> Result<EnvMap> {
    let mut files = fs::read_dir(dir)
        .map_err(|e| Error::Io("failed to read config dir", e))?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_yaml(path))
        .collect::<Vec<_>>();
    files.sort();

    if files.is_empty() {
        return Err(Error::NoConfigFiles(dir.to_path_buf()));
    }

    let mut merged = EnvMap::new();
    for file in &files {
        debug!("loading config from {}", file.display());
        merged.merge(&read_yaml_file(file)?);
    }
    Ok(merged)
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == "yaml" || ext == "yml")
}

/// Loads the merged configuration.
///
/// `path` may be a directory (every YAML file merged in name order) or a
/// single file; `None` uses the default config directory and tolerates its
/// absence. Overrides are applied last and the result is validated.
///
/// # Errors
///
/// Returns an error if an explicit path is missing, a file fails to parse, a
/// value cannot be decoded, or validation fails.
pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Config> {
    let mut config = Config::default();

    match path {
        Some(path) if path.is_dir() => config.apply_env_map(&read_config_dir(path)?)?,
        Some(path) if path.is_file() => config.apply_env_map(&read_yaml_file(path)?)?,
        Some(path) => return Err(Error::NotFound(path.to_path_buf())),
        None => {
            let dir = Path::new(crate::constants::CONFIG_DIR);
            match read_config_dir(dir) {
                Ok(map) => config.apply_env_map(&map)?,
                Err(e) => warn!("using built-in defaults: {e}"),
            }
        }
    }

    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_dir_files_merge_in_name_order() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.yml"), "ROLE: worker\nCLUSTER_ID: second\n").unwrap();
        fs::write(dir.path().join("a.yaml"), "ROLE: master\nHOSTID: h1\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ROLE: none\n").unwrap();

        let config = load(Some(dir.path()), &ConfigOverrides::default()).unwrap();

        assert_eq!(config.role, ClusterRole::Worker);
        assert_eq!(config.cluster_id, "second");
        assert_eq!(config.host_id, "h1");
    }

    #[test]
    fn test_empty_dir_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("readme.md"), "nothing").unwrap();

        assert!(matches!(
            load(Some(dir.path()), &ConfigOverrides::default()),
            Err(Error::NoConfigFiles(_))
        ));
    }

    #[test]
    fn test_missing_path_is_an_error() {
        let dir = tempdir().unwrap();

        assert!(matches!(
            load(Some(&dir.path().join("nope.yaml")), &ConfigOverrides::default()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_overrides_win() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("config.yaml");
        fs::write(
            &file,
            "ROLE: master\nLOOP_INTERVAL: 45\nKUBE_SERVICE_STATE: \"true\"\nDISABLE_SUNPIKE: false\n",
        )
        .unwrap();
        let overrides = ConfigOverrides {
            role: Some(ClusterRole::Worker),
            loop_interval: Some(120),
            disable_sunpike: true,
            ..ConfigOverrides::default()
        };

        let config = load(Some(&file), &overrides).unwrap();

        assert_eq!(config.role, ClusterRole::Worker);
        assert_eq!(config.loop_interval, 120);
        assert_eq!(config.kube_service_state, ServiceState::True);
        assert!(config.disable_sunpike);
    }

    #[test]
    fn test_short_loop_interval_is_fatal() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("config.yaml");
        fs::write(&file, "LOOP_INTERVAL: 10\n").unwrap();

        assert!(matches!(
            load(Some(&file), &ConfigOverrides::default()),
            Err(Error::LoopIntervalTooShort(10))
        ));
    }

    #[test]
    fn test_invalid_role_is_fatal() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("config.yaml");
        fs::write(&file, "ROLE: etcd\n").unwrap();

        assert!(load(Some(&file), &ConfigOverrides::default()).is_err());
    }
}
