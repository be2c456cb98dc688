//! Well-known paths and values shared by the agent and its phase scripts.

/// Directory holding the nodelet YAML configuration.
pub const CONFIG_DIR: &str = "/etc/pf9/nodelet/";

/// File the observed state is persisted to for the host agent extension.
pub const EXTENSION_OUTPUT_FILE: &str = "/var/opt/pf9/kube_status";

/// Canonical kube.env symlink consumed by phase scripts.
pub const KUBE_ENV_PATH: &str = "/etc/pf9/kube.env";

/// kube.env rendered from the resource manager configuration.
pub const RESMGR_KUBE_ENV_PATH: &str = "/etc/pf9/kube_resmgr.env";

/// kube.env rendered from the conductor-provided configuration.
pub const SUNPIKE_KUBE_ENV_PATH: &str = "/etc/pf9/kube_sunpike.env";

/// YAML snapshot of the conductor-provided configuration.
pub const SUNPIKE_CONFIG_PATH: &str = "/etc/pf9/nodelet/config_sunpike.yaml";

/// Directory containing the phase scripts.
pub const PHASE_SCRIPTS_DIR: &str = "/opt/pf9/pf9-kube/phases";

/// Default location of user supplied image archives.
pub const USER_IMAGES_DIR: &str = "/var/opt/pf9/images";

/// Default hosts file used by the `CoreDNS` addon.
pub const COREDNS_HOSTS_FILE: &str = "/etc/hosts";

/// Registry for the official Kubernetes images.
pub const K8S_REGISTRY: &str = "k8s.gcr.io";

/// Default container runtime.
pub const RUNTIME: &str = "containerd";

/// Default cgroup driver for containerd.
pub const CONTAINERD_CGROUP: &str = "systemd";

/// Default number of rotated container log files.
pub const CONTAINER_LOG_MAX_FILES: &str = "10";

/// Default size of a container log file before rotation.
pub const CONTAINER_LOG_MAX_SIZE: &str = "10Mi";

/// Default kubelet CPU and topology manager policy.
pub const MANAGER_POLICY_NONE: &str = "none";

/// Default reconcile loop interval in seconds.
pub const DEFAULT_LOOP_INTERVAL: u64 = 60;

/// Smallest accepted reconcile loop interval in seconds.
pub const MIN_LOOP_INTERVAL: u64 = 30;

/// Default conductor address.
pub const TRANSPORT_URL: &str = "localhost:8111";

/// Key under which the host id travels in the kube.env view.
pub const HOST_ID_KEY: &str = "HOSTID";

/// Header prepended to every file the agent generates.
pub const GENERATED_FILE_HEADER: &str = "# Generated by Nodelet. DO NOT EDIT.";
