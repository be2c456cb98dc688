use crate::constants;
use crate::env_map::{EnvMap, parse_bool};
use crate::types::{ClusterRole, ServiceState};
use crate::{Error, Result};

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Conversion between a config field and its string form in the kube.env view.
pub trait ConfigValue: Sized {
    /// Renders the value for kube.env and YAML.
    fn to_env(&self) -> String;

    /// Decodes a raw string found under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] if `raw` cannot be decoded.
    fn from_env(key: &str, raw: &str) -> Result<Self>;
}

fn invalid(key: &str, raw: &str) -> Error {
    Error::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    }
}

impl ConfigValue for String {
    fn to_env(&self) -> String {
        self.clone()
    }

    fn from_env(_key: &str, raw: &str) -> Result<Self> {
        Ok(raw.to_string())
    }
}

impl ConfigValue for PathBuf {
    fn to_env(&self) -> String {
        self.to_string_lossy().into_owned()
    }

    fn from_env(_key: &str, raw: &str) -> Result<Self> {
        Ok(Self::from(raw.trim()))
    }
}

impl ConfigValue for bool {
    fn to_env(&self) -> String {
        self.to_string()
    }

    fn from_env(key: &str, raw: &str) -> Result<Self> {
        parse_bool(raw).ok_or_else(|| invalid(key, raw))
    }
}

macro_rules! numeric_config_value {
    ($($ty:ty),*) => {
        $(
            impl ConfigValue for $ty {
                fn to_env(&self) -> String {
                    self.to_string()
                }

                // An empty value decodes to zero so a bare `KEY:` in YAML stays loadable.
                fn from_env(key: &str, raw: &str) -> Result<Self> {
                    let raw_trimmed = raw.trim();
                    if raw_trimmed.is_empty() {
                        return Ok(<$ty>::default());
                    }
                    raw_trimmed.parse().map_err(|_| invalid(key, raw))
                }
            }
        )*
    };
}

numeric_config_value!(u32, u64, usize, f64);

impl ConfigValue for ClusterRole {
    fn to_env(&self) -> String {
        self.as_str().to_string()
    }

    fn from_env(_key: &str, raw: &str) -> Result<Self> {
        raw.parse()
    }
}

impl ConfigValue for ServiceState {
    fn to_env(&self) -> String {
        self.as_str().to_string()
    }

    fn from_env(_key: &str, raw: &str) -> Result<Self> {
        raw.parse()
    }
}

/// Declares the [`Config`] struct together with its key table.
///
/// Each entry is `field: Type = "KEY", default;`. The key table drives both
/// directions of the kube.env conversion so the two can never drift apart.
macro_rules! config_keys {
    ($( $(#[$meta:meta])* $field:ident : $ty:ty = $key:literal, $default:expr; )*) => {
        /// Merged node agent configuration.
        ///
        /// Every field corresponds to one uppercase key shared by the YAML
        /// files, the kube.env file handed to phase scripts, and the host spec
        /// exchanged with the conductor. Keys with no field are kept in
        /// [`Config::extra`].
        #[derive(Clone, Debug, PartialEq)]
        pub struct Config {
            $( $(#[$meta])* pub $field: $ty, )*

            /// Keys with no dedicated field, kept verbatim.
            pub extra: BTreeMap<String, String>,
        }

        impl Default for Config {
            fn default() -> Self {
                Self {
                    $( $field: $default, )*
                    extra: BTreeMap::new(),
                }
            }
        }

        /// Every key that maps onto a dedicated [`Config`] field.
        pub const KNOWN_KEYS: &[&str] = &[$( $key ),*];

        impl Config {
            /// Applies every entry of `map` on top of this config.
            ///
            /// Keys are matched case-insensitively; unknown keys land in
            /// [`Config::extra`].
            ///
            /// # Errors
            ///
            /// Returns [`Error::InvalidValue`] if a known key holds a value
            /// that cannot be decoded into its field.
            pub fn apply_env_map(&mut self, map: &EnvMap) -> Result<()> {
                for (key, value) in map {
                    let upper = key.trim().to_ascii_uppercase();
                    match upper.as_str() {
                        $( $key => self.$field = ConfigValue::from_env($key, value)?, )*
                        _ => {
                            self.extra.insert(upper, value.clone());
                        }
                    }
                }
                Ok(())
            }

            /// Renders every known key plus the extras.
            ///
            /// Extras never override a known key.
            #[must_use]
            pub fn to_env_map(&self) -> EnvMap {
                let mut map = EnvMap::new();
                for (key, value) in &self.extra {
                    map.insert(key.clone(), value.clone());
                }
                $( map.insert($key, ConfigValue::to_env(&self.$field)); )*
                map
            }
        }
    };
}

config_keys! {
    /// Enables debug logging and `--debug` for phase scripts.
    debug: bool = "DEBUG", false;
    /// Report the host by hostname instead of its address.
    use_hostname: bool = "USE_HOSTNAME", false;
    /// Desired cluster role.
    role: ClusterRole = "ROLE", ClusterRole::None;
    /// Desired cluster id.
    cluster_id: String = "CLUSTER_ID", String::new();
    /// Id of this host, used as the conductor object name.
    host_id: String = "HOSTID", String::new();
    /// Conductor address as `host:port`.
    transport_url: String = "TRANSPORT_URL", constants::TRANSPORT_URL.to_string();
    /// Conductor connect and per-call timeout in seconds.
    connect_timeout: u64 = "CONNECTION_TIMEOUT", 20;
    /// Desired service state.
    kube_service_state: ServiceState = "KUBE_SERVICE_STATE", ServiceState::Ignore;
    /// Every Nth consecutive failed start stops the whole chain first.
    full_retry_count: u32 = "FULL_RETRY_COUNT", 10;
    /// Run status checks inside a CPU limited cgroup.
    use_cgroups: bool = "USE_CGROUPS", true;
    /// Attempts for script status and stop operations.
    phase_retry: u32 = "PHASE_RETRY", 3;
    /// CPU percentage available to status checks.
    cpu_limit: f64 = "CPU_LIMIT", 40.0;
    /// Seconds a failing status check is tolerated after the last success.
    status_threshold_seconds: u64 = "PF9_STATUS_THRESHOLD_SECONDS", 0;
    /// Seconds between reconcile ticks.
    loop_interval: u64 = "LOOP_INTERVAL", constants::DEFAULT_LOOP_INTERVAL;
    /// Directory holding the phase scripts.
    phase_scripts_dir: PathBuf = "PHASE_SCRIPTS_DIR", PathBuf::from(constants::PHASE_SCRIPTS_DIR);
    /// Path of the persisted observed state.
    extension_output_file: PathBuf = "EXTENSION_OUTPUT_FILE", PathBuf::from(constants::EXTENSION_OUTPUT_FILE);
    /// Canonical kube.env symlink read by phase scripts.
    kube_env_path: PathBuf = "KUBE_ENV_PATH", PathBuf::from(constants::KUBE_ENV_PATH);
    /// kube.env rendered from local configuration.
    resmgr_kube_env_path: PathBuf = "RESMGR_KUBE_ENV_PATH", PathBuf::from(constants::RESMGR_KUBE_ENV_PATH);
    /// YAML snapshot of the conductor-provided configuration.
    sunpike_config_path: PathBuf = "SUNPIKE_CONFIG_PATH", PathBuf::from(constants::SUNPIKE_CONFIG_PATH);
    /// kube.env rendered from the conductor-provided configuration.
    sunpike_kube_env_path: PathBuf = "SUNPIKE_KUBE_ENV_PATH", PathBuf::from(constants::SUNPIKE_KUBE_ENV_PATH);
    /// Never talk to the conductor.
    disable_sunpike: bool = "DISABLE_SUNPIKE", false;
    /// Run a single reconcile tick and return.
    disable_loop: bool = "DISABLE_LOOP", false;
    /// Never read or write the state file.
    disable_ext_file: bool = "DISABLE_EXTFILE", false;
    /// Never run phase scripts.
    disable_scripts: bool = "DISABLE_SCRIPTS", false;
    /// Never apply config received from the conductor.
    disable_config_update: bool = "DISABLE_CONFIGUPDATE", false;
    /// Keep running after writing a config update.
    disable_exit_on_update: bool = "DISABLE_EXITONUPDATE", false;
    /// Attempts per conductor call.
    grpc_retry_max: u32 = "GRPC_RETRY_MAX", 3;
    /// Deadline of a single conductor call attempt in seconds.
    grpc_retry_timeout_seconds: u64 = "GRPC_RETRY_TIMEOUT_SECONDS", 5;
    /// Trailing lines of script output kept in logs and phase messages.
    num_cmd_output_lines_to_log: usize = "NUM_CMD_OP_LINES_TO_LOG", 10;
    /// Cloud provider the cluster runs on.
    cloud_provider_type: String = "CLOUD_PROVIDER_TYPE", String::new();
    /// Address of the cluster API endpoint.
    master_ip: String = "MASTER_IP", String::new();
    /// Port of the cluster API endpoint.
    k8s_api_port: String = "K8S_API_PORT", String::new();
    /// Leave masters schedulable for workloads.
    allow_workloads_on_master: bool = "ALLOW_WORKLOADS_ON_MASTER", false;
    /// Directory of image archives loaded into the runtime.
    user_images_dir: PathBuf = "USER_IMAGES_DIR", PathBuf::from(constants::USER_IMAGES_DIR);
    /// Registry hosting the Kubernetes images.
    k8s_private_registry: String = "K8S_PRIVATE_REGISTRY", constants::K8S_REGISTRY.to_string();
    /// Service network CIDR.
    services_cidr: String = "SERVICES_CIDR", String::new();
    /// Deploy the application catalog addon.
    app_catalog_enabled: bool = "APP_CATALOG_ENABLED", false;
    /// Cloud config handed to the kubelet.
    kubelet_cloud_config: String = "KUBELET_CLOUD_CONFIG", String::new();
    /// Hosts file mounted into CoreDNS.
    coredns_hosts_file: PathBuf = "COREDNS_HOSTS_FILE", PathBuf::from(constants::COREDNS_HOSTS_FILE);
    /// Container runtime.
    runtime: String = "RUNTIME", constants::RUNTIME.to_string();
    /// Rotated container log files kept.
    container_log_max_files: String = "CONTAINER_LOG_MAX_FILES", constants::CONTAINER_LOG_MAX_FILES.to_string();
    /// Container log size before rotation.
    container_log_max_size: String = "CONTAINER_LOG_MAX_SIZE", constants::CONTAINER_LOG_MAX_SIZE.to_string();
    /// Enable the cluster autoscaler.
    enable_cas: bool = "ENABLE_CAS", false;
    /// Cgroup driver used by containerd.
    containerd_cgroup: String = "CONTAINERD_CGROUP", constants::CONTAINERD_CGROUP.to_string();
    /// Let the kubelet run with swap enabled.
    allow_swap: bool = "ALLOW_SWAP", false;
    /// Kubelet CPU manager policy.
    cpu_manager_policy: String = "CPU_MANAGER_POLICY", constants::MANAGER_POLICY_NONE.to_string();
    /// Kubelet topology manager policy.
    topology_manager_policy: String = "TOPOLOGY_MANAGER_POLICY", constants::MANAGER_POLICY_NONE.to_string();
    /// CPUs reserved for system daemons.
    reserved_cpus: String = "RESERVED_CPUS", String::new();
}

impl Config {
    /// Builds a config from defaults overlaid with `map`.
    ///
    /// # Errors
    ///
    /// Returns an error if a known key holds an undecodable value.
    pub fn from_env_map(map: &EnvMap) -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_map(map)?;
        Ok(config)
    }

    /// Checks the values that must hold before the agent starts.
    ///
    /// # Errors
    ///
    /// Returns an error if the loop interval is below the minimum or either
    /// retry count is zero. `cpu_limit` is checked by the cgroup setup,
    /// which falls back to running without cgroups.
    pub fn validate(&self) -> Result<()> {
        if self.loop_interval < constants::MIN_LOOP_INTERVAL {
            return Err(Error::LoopIntervalTooShort(self.loop_interval));
        }
        if self.full_retry_count == 0 {
            return Err(Error::InvalidFullRetryCount);
        }
        if self.phase_retry == 0 {
            return Err(Error::InvalidPhaseRetry);
        }
        Ok(())
    }

    /// Whether cgroup wrapping of status checks is active.
    #[must_use]
    pub const fn cgroups_enabled(&self) -> bool {
        self.use_cgroups && !self.disable_scripts
    }
}
