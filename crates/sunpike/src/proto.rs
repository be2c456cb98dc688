//! Wire types of the `sunpike.conductor.v1alpha1` API, limited to what the
//! node agent exchanges with the conductor.
#![allow(missing_docs)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::derive_partial_eq_without_eq)]

use std::collections::BTreeMap;

/// A host as known to the conductor.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Host {
    #[prost(message, optional, tag = "1")]
    pub metadata: Option<ObjectMeta>,
    #[prost(message, optional, tag = "2")]
    pub spec: Option<HostSpec>,
    #[prost(message, optional, tag = "3")]
    pub status: Option<HostStatus>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ObjectMeta {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(btree_map = "string, string", tag = "2")]
    pub labels: BTreeMap<String, String>,
}

/// Desired configuration of a host.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HostSpec {
    /// Keys with no dedicated field.
    #[prost(btree_map = "string, string", tag = "1")]
    pub extra_cfg: BTreeMap<String, String>,
    #[prost(message, optional, tag = "2")]
    pub pf9: Option<Pf9Opts>,
    #[prost(message, optional, tag = "4")]
    pub etcd: Option<EtcdOpts>,
    #[prost(string, tag = "5")]
    pub extra_opts: String,
    #[prost(string, tag = "6")]
    pub services_cidr: String,
    #[prost(string, tag = "7")]
    pub containers_cidr: String,
    #[prost(bool, tag = "8")]
    pub allow_workloads_on_master: bool,
    #[prost(message, optional, tag = "9")]
    pub kubelet: Option<KubeletOpts>,
    #[prost(string, tag = "14")]
    pub k8s_private_registry: String,
    #[prost(string, tag = "15")]
    pub runtime: String,
    #[prost(string, tag = "16")]
    pub services_cidr_v6: String,
    #[prost(bool, tag = "17")]
    pub use_hostname: bool,
    #[prost(message, optional, tag = "18")]
    pub cni: Option<CniOpts>,
    #[prost(message, optional, tag = "19")]
    pub apiserver: Option<ApiserverOpts>,
    #[prost(message, optional, tag = "20")]
    pub kube_proxy: Option<KubeProxyOpts>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Pf9Opts {
    #[prost(string, tag = "1")]
    pub cluster_id: String,
    #[prost(string, tag = "2")]
    pub role: String,
    #[prost(string, tag = "3")]
    pub kube_service_state: String,
    #[prost(bool, tag = "4")]
    pub debug: bool,
    #[prost(string, tag = "5")]
    pub cloud_provider_type: String,
    #[prost(string, tag = "6")]
    pub master_ip: String,
    #[prost(string, tag = "7")]
    pub cluster_name: String,
    #[prost(string, tag = "8")]
    pub external_dns_name: String,
    #[prost(string, tag = "9")]
    pub cluster_project_id: String,
    #[prost(bool, tag = "10")]
    pub masterless_enabled: bool,
    #[prost(bool, tag = "11")]
    pub is_airgapped: bool,
    #[prost(string, tag = "12")]
    pub master_ipv6: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KubeletOpts {
    #[prost(string, tag = "1")]
    pub cloud_cfg: String,
    #[prost(string, tag = "2")]
    pub provider_id: String,
    #[prost(string, tag = "3")]
    pub extra_args: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EtcdOpts {
    #[prost(string, tag = "1")]
    pub data_dir: String,
    #[prost(string, tag = "2")]
    pub discovery_url: String,
    #[prost(string, tag = "3")]
    pub election_timeout: String,
    #[prost(string, tag = "4")]
    pub env: String,
    #[prost(string, tag = "5")]
    pub heartbeat_interval: String,
    #[prost(string, tag = "6")]
    pub version: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CniOpts {
    #[prost(string, tag = "1")]
    pub bridge: String,
    #[prost(string, tag = "2")]
    pub mtu_size: String,
    #[prost(bool, tag = "3")]
    pub ipv6_enabled: bool,
    #[prost(string, tag = "4")]
    pub network_plugin: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApiserverOpts {
    #[prost(string, tag = "1")]
    pub k8s_api_port: String,
    #[prost(bool, tag = "2")]
    pub privileged: bool,
    #[prost(string, tag = "3")]
    pub extra_args: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KubeProxyOpts {
    #[prost(string, tag = "1")]
    pub mode: String,
}

/// Observed state of a host as reported by the node agent.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HostStatus {
    #[prost(string, tag = "1")]
    pub host_state: String,
    #[prost(string, tag = "2")]
    pub cluster_role: String,
    #[prost(string, tag = "3")]
    pub cluster_id: String,
    #[prost(bool, tag = "4")]
    pub service_state: bool,
    #[prost(string, tag = "5")]
    pub hostname: String,
    #[prost(message, optional, tag = "6")]
    pub nodelet: Option<NodeletStatus>,
    #[prost(message, repeated, tag = "10")]
    pub phases: Vec<HostPhase>,
    /// Order of the latest completed phase, -1 for none.
    #[prost(int32, tag = "11")]
    pub phase_completed: i32,
    #[prost(int32, tag = "12")]
    pub last_failed_phase: i32,
    #[prost(int32, tag = "13")]
    pub start_attempts: i32,
    #[prost(int32, tag = "14")]
    pub current_phase: i32,
    #[prost(int32, repeated, tag = "20")]
    pub all_status_checks: Vec<i32>,
    #[prost(int32, tag = "21")]
    pub last_failed_check: i32,
    #[prost(int64, tag = "22")]
    pub last_failed_check_time: i64,
    #[prost(int32, tag = "23")]
    pub current_status_check: i32,
    #[prost(int64, tag = "24")]
    pub current_status_check_time: i64,
}

/// Reported form of one phase record.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HostPhase {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(int32, tag = "2")]
    pub order: i32,
    #[prost(int64, tag = "3")]
    pub started_at: i64,
    #[prost(string, tag = "4")]
    pub operation: String,
    #[prost(string, tag = "5")]
    pub status: String,
    #[prost(string, tag = "6")]
    pub message: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeletStatus {
    #[prost(string, tag = "1")]
    pub version: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateHostStatusRequest {
    #[prost(message, optional, tag = "1")]
    pub status: Option<Host>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateHostStatusResponse {
    #[prost(message, optional, tag = "1")]
    pub host: Option<Host>,
}
