use crate::cgroups::setup_cgroups;
use crate::{Error, Phase, Result, ScriptLauncher, ScriptPhase};

use std::sync::Arc;

use nodelet_config::{ClusterRole, Config};
use tracing::info;

/// Declared orders of every known phase.
pub mod orders {
    /// Cleanup-only phase of hosts without a role.
    pub const NO_ROLE: u32 = 10;
    /// Certificate generation.
    pub const GEN_CERTS: u32 = 20;
    /// Kubeconfig preparation.
    pub const KUBECONFIG: u32 = 30;
    /// Container runtime configuration.
    pub const CONFIGURE_RUNTIME: u32 = 40;
    /// Container runtime start.
    pub const START_RUNTIME: u32 = 45;
    /// User image loading.
    pub const LOAD_IMAGE: u32 = 48;
    /// etcd configuration.
    pub const CONFIGURE_ETCD: u32 = 50;
    /// etcd start.
    pub const START_ETCD: u32 = 55;
    /// Host network configuration.
    pub const CONFIGURE_NETWORK: u32 = 60;
    /// CNI plugin configuration.
    pub const CONFIGURE_CNI: u32 = 65;
    /// Authentication webhook.
    pub const AUTH_WEBHOOK: u32 = 70;
    /// Miscellaneous checks.
    pub const MISC: u32 = 75;
    /// kubelet configuration and start.
    pub const CONFIGURE_KUBELET: u32 = 80;
    /// kube-proxy start.
    pub const KUBE_PROXY: u32 = 90;
    /// Wait for cluster services.
    pub const WAIT_FOR_K8S_SVC: u32 = 100;
    /// Node labels and taints.
    pub const LABEL_TAINT: u32 = 110;
    /// Dynamic kubelet configuration.
    pub const DYNAMIC_KUBELET_CONFIG: u32 = 120;
    /// Node uncordon.
    pub const UNCORDON: u32 = 130;
    /// Application catalog addon.
    pub const APP_CATALOG: u32 = 160;
    /// Keepalived for the API VIP.
    pub const KEEPALIVED: u32 = 180;
    /// `CoreDNS` addon.
    pub const COREDNS: u32 = 206;
    /// Pod drain, effective on stop only.
    pub const DRAIN_PODS: u32 = 210;
}

struct PhaseSpec {
    order: u32,
    name: &'static str,
    file: &'static str,
}

const fn spec(order: u32, name: &'static str, file: &'static str) -> PhaseSpec {
    PhaseSpec { order, name, file }
}

const PHASES: &[PhaseSpec] = &[
    spec(orders::NO_ROLE, "No role assigned. (Cleanup scripts only)", "all-none-scripts.sh"),
    spec(orders::GEN_CERTS, "Generate certs / Send signing request to CA", "gen_certs.sh"),
    spec(orders::KUBECONFIG, "Prepare configuration", "prepare_kube_configs.sh"),
    spec(orders::CONFIGURE_RUNTIME, "Configure Container Runtime", "runtime_configure.sh"),
    spec(orders::START_RUNTIME, "Start Container Runtime", "start_container_runtime.sh"),
    spec(orders::LOAD_IMAGE, "Load user images to container runtime", "load_user_images.sh"),
    spec(orders::CONFIGURE_ETCD, "Configure etcd", "configure_etcd.sh"),
    spec(orders::START_ETCD, "Start etcd", "start_etcd.sh"),
    spec(orders::CONFIGURE_NETWORK, "Network configuration", "network_configure.sh"),
    spec(orders::CONFIGURE_CNI, "Configure CNI plugin", "cni_configure.sh"),
    spec(orders::AUTH_WEBHOOK, "Configure and start pf9-bouncer", "auth_webhook.sh"),
    spec(orders::MISC, "Miscellaneous scripts and checks", "misc_scripts.sh"),
    spec(orders::CONFIGURE_KUBELET, "Configure and Start kubelet", "kubelet_configure_start.sh"),
    spec(orders::KUBE_PROXY, "Configure and start kube-proxy", "kube_proxy_start.sh"),
    spec(orders::WAIT_FOR_K8S_SVC, "Wait for k8s services", "wait_for_k8s_svc.sh"),
    spec(orders::LABEL_TAINT, "Apply and validate node taints", "label_taint_node.sh"),
    spec(orders::DYNAMIC_KUBELET_CONFIG, "Apply dynamic kubelet configuration", "dynamic_kubelet_config.sh"),
    spec(orders::UNCORDON, "Uncordon node", "uncordon_node.sh"),
    spec(orders::APP_CATALOG, "Deploy app catalog", "deploy_app_catalog.sh"),
    spec(orders::KEEPALIVED, "Configure and start Keepalived", "configure_start_keepalived.sh"),
    spec(orders::COREDNS, "Configure and start CoreDNS", "pf9_coredns.sh"),
    spec(orders::DRAIN_PODS, "Drain all pods (stop only operation)", "drain_node.sh"),
];

const MASTER_CHAIN: &[u32] = &[
    orders::GEN_CERTS,
    orders::KUBECONFIG,
    orders::CONFIGURE_RUNTIME,
    orders::START_RUNTIME,
    orders::LOAD_IMAGE,
    orders::CONFIGURE_ETCD,
    orders::START_ETCD,
    orders::CONFIGURE_NETWORK,
    orders::CONFIGURE_CNI,
    orders::AUTH_WEBHOOK,
    orders::MISC,
    orders::CONFIGURE_KUBELET,
    orders::KUBE_PROXY,
    orders::WAIT_FOR_K8S_SVC,
    orders::LABEL_TAINT,
    orders::DYNAMIC_KUBELET_CONFIG,
    orders::UNCORDON,
    orders::APP_CATALOG,
    orders::KEEPALIVED,
    orders::COREDNS,
    orders::DRAIN_PODS,
];

const WORKER_CHAIN: &[u32] = &[
    orders::GEN_CERTS,
    orders::KUBECONFIG,
    orders::CONFIGURE_RUNTIME,
    orders::START_RUNTIME,
    orders::LOAD_IMAGE,
    orders::CONFIGURE_NETWORK,
    orders::CONFIGURE_CNI,
    orders::MISC,
    orders::CONFIGURE_KUBELET,
    orders::KUBE_PROXY,
    orders::WAIT_FOR_K8S_SVC,
    orders::LABEL_TAINT,
    orders::DYNAMIC_KUBELET_CONFIG,
    orders::UNCORDON,
    orders::DRAIN_PODS,
];

const NO_ROLE_CHAIN: &[u32] = &[orders::NO_ROLE];

/// An ordered, immutable list of phases for one role.
pub type Chain = Vec<Arc<dyn Phase>>;

/// Script file backing the phase with `order`, if it is a known phase.
#[must_use]
pub fn script_file(order: u32) -> Option<&'static str> {
    PHASES.iter().find(|p| p.order == order).map(|p| p.file)
}

fn build_chain(orders: &[u32], launcher: &Arc<ScriptLauncher>) -> Chain {
    orders
        .iter()
        .filter_map(|order| PHASES.iter().find(|p| p.order == *order))
        .map(|p| {
            Arc::new(ScriptPhase::new(p.name, p.order, p.file, Arc::clone(launcher)))
                as Arc<dyn Phase>
        })
        .collect()
}

/// Builds the freshly-ordered chain for `role`.
///
/// # Errors
///
/// Returns [`Error::InvalidOrder`] if the chain is not strictly ascending.
pub fn phases_for_role(role: ClusterRole, launcher: &Arc<ScriptLauncher>) -> Result<Chain> {
    let chain = match role {
        ClusterRole::Master => build_chain(MASTER_CHAIN, launcher),
        ClusterRole::Worker => build_chain(WORKER_CHAIN, launcher),
        ClusterRole::None => build_chain(NO_ROLE_CHAIN, launcher),
    };
    validate_phase_ordering(&chain)?;
    Ok(chain)
}

/// Checks that every phase's order is strictly greater than its predecessor's.
///
/// # Errors
///
/// Returns [`Error::InvalidOrder`] naming the first offending pair.
pub fn validate_phase_ordering(chain: &[Arc<dyn Phase>]) -> Result<()> {
    for pair in chain.windows(2) {
        let (current, next) = (&pair[0], &pair[1]);
        if current.order() >= next.order() {
            return Err(Error::InvalidOrder(
                current.name().to_string(),
                current.order(),
                next.name().to_string(),
                next.order(),
            ));
        }
    }
    Ok(())
}

/// Prepares the status-check cgroup and returns the chain for the configured role.
///
/// Cgroup failures are not fatal; they switch `config.use_cgroups` off.
///
/// # Errors
///
/// Returns an error if the chain for the role is invalid.
pub async fn init_and_load_role_phases(
    config: &mut Config,
    launcher: &Arc<ScriptLauncher>,
) -> Result<Chain> {
    setup_cgroups(config).await;
    let chain = phases_for_role(config.role, launcher)?;
    info!("loaded {} phases for role {}", chain.len(), config.role);
    Ok(chain)
}
