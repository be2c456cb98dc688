use crate::env_map::parse_bool;
use crate::{Error, Result};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kubernetes role this host should take in its cluster.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterRole {
    /// Control plane node.
    Master,

    /// Worker node.
    Worker,

    /// Not part of any cluster; only cleanup runs.
    #[default]
    None,
}

impl ClusterRole {
    /// Lowercase name used in config files and the state file.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Worker => "worker",
            Self::None => "none",
        }
    }
}

impl fmt::Display for ClusterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusterRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "master" => Ok(Self::Master),
            "worker" => Ok(Self::Worker),
            "none" | "" => Ok(Self::None),
            _ => Err(Error::InvalidValue {
                key: "ROLE".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Desired service state of the Kubernetes stack on this host.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// The host should be brought into the cluster.
    True,

    /// The host should be torn down.
    False,

    /// Only observe; never start or stop anything.
    #[default]
    Ignore,
}

impl ServiceState {
    /// Lowercase name used in config files.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::True => "true",
            Self::False => "false",
            Self::Ignore => "ignore",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("ignore") {
            return Ok(Self::Ignore);
        }
        match parse_bool(trimmed) {
            Some(true) => Ok(Self::True),
            Some(false) => Ok(Self::False),
            None => Err(Error::InvalidValue {
                key: "KUBE_SERVICE_STATE".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("Master".parse::<ClusterRole>().unwrap(), ClusterRole::Master);
        assert_eq!("".parse::<ClusterRole>().unwrap(), ClusterRole::None);
        assert!("etcd".parse::<ClusterRole>().is_err());
    }

    #[test]
    fn test_service_state_parsing() {
        assert_eq!("true".parse::<ServiceState>().unwrap(), ServiceState::True);
        assert_eq!("0".parse::<ServiceState>().unwrap(), ServiceState::False);
        assert_eq!("IGNORE".parse::<ServiceState>().unwrap(), ServiceState::Ignore);
        assert!("sometimes".parse::<ServiceState>().is_err());
    }
}
