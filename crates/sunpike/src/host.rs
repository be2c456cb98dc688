//! Conversion between the conductor's host spec and the flat [`EnvMap`] view.

use crate::proto::{Host, HostSpec, ObjectMeta};

use nodelet_config::constants::HOST_ID_KEY;
use nodelet_config::{EnvMap, parse_bool};

trait EnvValue: Sized {
    fn to_env(&self) -> String;
    fn from_env(raw: &str) -> Self;
}

impl EnvValue for String {
    fn to_env(&self) -> String {
        self.clone()
    }

    fn from_env(raw: &str) -> Self {
        raw.to_string()
    }
}

impl EnvValue for bool {
    fn to_env(&self) -> String {
        self.to_string()
    }

    fn from_env(raw: &str) -> Self {
        parse_bool(raw).unwrap_or(false)
    }
}

/// Declares the key table between [`HostSpec`] fields and `EnvMap` keys.
///
/// Top-level fields are listed first, then one block per nested options
/// message.
macro_rules! mirror {
    (
        top { $( $top_key:literal => $top_field:ident, )* }
        $( $section:ident { $( $key:literal => $field:ident, )* } )*
    ) => {
        /// Every `EnvMap` key with a dedicated [`HostSpec`] field.
        pub const MIRRORED_KEYS: &[&str] = &[
            $( $top_key, )*
            $( $( $key, )* )*
        ];

        fn spec_to_env(spec: &HostSpec, map: &mut EnvMap) {
            $( map.insert($top_key, EnvValue::to_env(&spec.$top_field)); )*
            $(
                let section = spec.$section.clone().unwrap_or_default();
                $( map.insert($key, EnvValue::to_env(&section.$field)); )*
            )*
        }

        // Returns false if `key` has no dedicated field.
        fn set_spec_field(spec: &mut HostSpec, key: &str, value: &str) -> bool {
            match key {
                $( $top_key => spec.$top_field = EnvValue::from_env(value), )*
                $( $(
                    $key => {
                        spec.$section.get_or_insert_with(Default::default).$field =
                            EnvValue::from_env(value);
                    }
                )* )*
                _ => return false,
            }
            true
        }
    };
}

mirror! {
    top {
        "EXTRA_OPTS" => extra_opts,
        "SERVICES_CIDR" => services_cidr,
        "CONTAINERS_CIDR" => containers_cidr,
        "ALLOW_WORKLOADS_ON_MASTER" => allow_workloads_on_master,
        "K8S_PRIVATE_REGISTRY" => k8s_private_registry,
        "RUNTIME" => runtime,
        "SERVICES_CIDR_V6" => services_cidr_v6,
        "USE_HOSTNAME" => use_hostname,
    }
    pf9 {
        "CLUSTER_ID" => cluster_id,
        "ROLE" => role,
        "KUBE_SERVICE_STATE" => kube_service_state,
        "DEBUG" => debug,
        "CLOUD_PROVIDER_TYPE" => cloud_provider_type,
        "MASTER_IP" => master_ip,
        "CLUSTER_NAME" => cluster_name,
        "EXTERNAL_DNS_NAME" => external_dns_name,
        "CLUSTER_PROJECT_ID" => cluster_project_id,
        "MASTERLESS_ENABLED" => masterless_enabled,
        "IS_AIRGAPPED" => is_airgapped,
        "MASTER_IPV6" => master_ipv6,
    }
    kubelet {
        "KUBELET_CLOUD_CONFIG" => cloud_cfg,
        "KUBELET_PROVIDER_ID" => provider_id,
        "KUBELET_FLAGS" => extra_args,
    }
    etcd {
        "ETCD_DATA_DIR" => data_dir,
        "ETCD_DISCOVERY_URL" => discovery_url,
        "ETCD_ELECTION_TIMEOUT" => election_timeout,
        "ETCD_ENV" => env,
        "ETCD_HEARTBEAT_INTERVAL" => heartbeat_interval,
        "ETCD_VERSION" => version,
    }
    cni {
        "CNI_BRIDGE" => bridge,
        "MTU_SIZE" => mtu_size,
        "IPV6_ENABLED" => ipv6_enabled,
        "PF9_NETWORK_PLUGIN" => network_plugin,
    }
    apiserver {
        "K8S_API_PORT" => k8s_api_port,
        "PRIVILEGED" => privileged,
        "API_SERVER_FLAGS" => extra_args,
    }
    kube_proxy {
        "KUBE_PROXY_MODE" => mode,
    }
}

/// Renders a host as an `EnvMap`.
///
/// Every mirrored field is emitted, the host name becomes `HOSTID` and the
/// extra keys are upper-cased. Extras never override a mirrored key.
#[must_use]
pub fn host_to_env_map(host: &Host) -> EnvMap {
    let mut map = EnvMap::new();
    let spec = host.spec.clone().unwrap_or_default();

    spec_to_env(&spec, &mut map);
    let name = host.metadata.as_ref().map(|m| m.name.clone()).unwrap_or_default();
    map.insert(HOST_ID_KEY, name);

    for (key, value) in &spec.extra_cfg {
        let key = key.to_ascii_uppercase();
        if !map.contains_key(&key) {
            map.insert(key, value.clone());
        }
    }

    map
}

/// Builds the desired spec part of a host from an `EnvMap`.
///
/// `HOSTID` becomes the host name and keys without a dedicated field land
/// in `extra_cfg`.
#[must_use]
pub fn env_map_to_host(map: &EnvMap) -> Host {
    let mut spec = HostSpec::default();
    let mut metadata = ObjectMeta::default();

    for (key, value) in map {
        if key == HOST_ID_KEY {
            metadata.name.clone_from(value);
        } else if !set_spec_field(&mut spec, key, value) {
            spec.extra_cfg.insert(key.clone(), value.clone());
        }
    }

    Host {
        metadata: Some(metadata),
        spec: Some(spec),
        status: None,
    }
}

/// Whether `spec` carries no configuration at all.
///
/// The conductor answers with an empty spec when it has nothing for the
/// host yet.
#[must_use]
pub fn is_empty_spec(spec: Option<&HostSpec>) -> bool {
    spec.is_none_or(|spec| *spec == HostSpec::default())
}
