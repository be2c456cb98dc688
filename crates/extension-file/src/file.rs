use crate::data::ExtensionData;
use crate::{Error, Result};

use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use nodelet_config::parse_bool;
use tracing::{debug, info, warn};

/// The on-disk state file consumed by the host agent extension.
#[derive(Clone, Debug)]
pub struct ExtensionFile {
    path: PathBuf,
}

impl ExtensionFile {
    /// Creates a handle for the state file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the state file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted record.
    ///
    /// A missing file yields a fresh record. A file that is not valid JSON is
    /// read as the legacy `key value` format and rewritten as JSON. A
    /// persisted `ok` node state is reset to converging.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, or if a legacy
    /// file cannot be rewritten.
    pub fn load(&self) -> Result<ExtensionData> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{} does not exist, starting fresh", self.path.display());
                return Ok(ExtensionData::new());
            }
            Err(e) => return Err(Error::Io("failed to read state file", e)),
        };

        let mut data = match serde_json::from_str::<ExtensionData>(&contents) {
            Ok(data) => data,
            Err(e) => {
                warn!(
                    "{} is not valid JSON ({e}), converting from legacy format",
                    self.path.display()
                );
                let data = convert_legacy(&contents);
                self.write(&data)?;
                info!("converted state file to JSON");
                data
            }
        };

        data.reset_after_load();
        Ok(data)
    }

    /// Writes the record as JSON through a temporary file and a rename.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any filesystem step fails.
    pub fn write(&self, data: &ExtensionData) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Io("failed to create state file directory", e))?;
        }

        let json = serde_json::to_string_pretty(data)?;
        let tmp = self.tmp_path();
        fs::write(&tmp, json).map_err(|e| Error::Io("failed to write state file", e))?;
        fs::rename(&tmp, &self.path).map_err(|e| Error::Io("failed to replace state file", e))?;

        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}

/// Parses the legacy whitespace-delimited `key value` format.
///
/// Identity and counters are carried over; lists and progress markers are
/// reset since the legacy format cannot describe them.
fn convert_legacy(contents: &str) -> ExtensionData {
    let mut data = ExtensionData::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once(' ').unwrap_or((line, ""));
        let (key, value) = (key.trim(), value.trim());

        match key {
            "pf9_kube_service_state" => data.service_state = parse_bool(value).unwrap_or(false),
            "pf9_kube_node_state" => data.node_state = value.to_string().into(),
            "pf9_kube_start_attempt" => data.start_attempts = value.parse().unwrap_or(0),
            "pf9_cluster_id" => {
                data.cluster_id = if value == "\"\"" {
                    String::new()
                } else {
                    value.to_string()
                };
            }
            "pf9_cluster_role" => data.cluster_role = value.to_string(),
            "all_status_checks" | "all_tasks" | "completed_tasks" | "current_status_check"
            | "current_task" | "last_failed_status_check" | "last_failed_status_time"
            | "last_failed_task" | "status_check_timestamp" => {}
            other => debug!("ignoring legacy state key {other:?}"),
        }
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::NodeState;

    use pretty_assertions::assert_eq;
    use tempfile::tempdir;
    use tracing_test::traced_test;

    const LEGACY: &str = "\
# written by an older agent
pf9_kube_service_state true
pf9_kube_node_state retrying
pf9_kube_start_attempt 3
pf9_cluster_id \"\"
pf9_cluster_role worker
all_tasks gen_certs.sh prepare_kube_configs.sh
current_task gen_certs.sh
last_failed_status_time 12345
";

    #[test]
    fn test_missing_file_is_fresh() {
        let dir = tempdir().unwrap();
        let file = ExtensionFile::new(dir.path().join("kube_status"));

        let data = file.load().unwrap();

        assert_eq!(data, ExtensionData::new());
        assert!(!file.path().exists());
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempdir().unwrap();
        let file = ExtensionFile::new(dir.path().join("nested").join("kube_status"));
        let data = ExtensionData {
            service_state: true,
            node_state: NodeState::Retrying,
            start_attempts: 4,
            cluster_id: "c1".to_string(),
            cluster_role: "master".to_string(),
            all_phases: vec!["a".to_string(), "b".to_string()],
            completed_phases: vec!["a".to_string()],
            last_failed_phase: "b".to_string(),
            ..ExtensionData::new()
        };

        file.write(&data).unwrap();
        let loaded = file.load().unwrap();

        assert_eq!(loaded, data);
        assert!(!dir.path().join("nested").join("kube_status.tmp").exists());
    }

    #[test]
    fn test_ok_is_reset_on_load() {
        let dir = tempdir().unwrap();
        let file = ExtensionFile::new(dir.path().join("kube_status"));
        let data = ExtensionData {
            node_state: NodeState::Ok,
            start_attempts: 0,
            ..ExtensionData::new()
        };
        file.write(&data).unwrap();

        let loaded = file.load().unwrap();

        assert_eq!(loaded.node_state, NodeState::Converging);
        assert_eq!(loaded.start_attempts, 1);
    }

    #[test]
    #[traced_test]
    fn test_legacy_file_is_converted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kube_status");
        fs::write(&path, LEGACY).unwrap();
        let file = ExtensionFile::new(&path);

        let data = file.load().unwrap();

        assert!(data.service_state);
        assert_eq!(data.node_state, NodeState::Retrying);
        assert_eq!(data.start_attempts, 3);
        assert_eq!(data.cluster_id, "");
        assert_eq!(data.cluster_role, "worker");
        assert!(data.all_phases.is_empty());
        assert_eq!(data.current_phase, "");
        assert_eq!(data.last_failed_check_time, 0);

        let rewritten: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(rewritten["pf9_cluster_role"], "worker");
        assert!(logs_contain("converted state file to JSON"));
    }

    #[test]
    fn test_legacy_conversion_is_stable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kube_status");
        fs::write(&path, LEGACY).unwrap();
        let file = ExtensionFile::new(&path);

        let first = file.load().unwrap();
        let after_first = fs::read_to_string(&path).unwrap();
        let second = file.load().unwrap();

        assert_eq!(first, second);
        assert_eq!(fs::read_to_string(&path).unwrap(), after_first);
    }

    #[test]
    fn test_legacy_bad_attempt_count_is_zero() {
        let data = convert_legacy("pf9_kube_start_attempt many\npf9_cluster_id c9\n");

        assert_eq!(data.start_attempts, 0);
        assert_eq!(data.cluster_id, "c9");
    }
}
