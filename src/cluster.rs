//! Declared cluster intent (`Cluster`) and observed live state (`ClusterStatus`).
use crate::{
    error::{ReconcileError, Result},
    node::Node,
};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Extra, free-form arguments threaded into a rendered service configuration.
/// Kept opaque here — the encoder that turns this into a real
/// kubelet/apiserver/... config object lives outside this crate (§1).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServiceParams {
    /// Extra command-line arguments appended verbatim.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// Per-service configuration knobs, keyed by the component they configure.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Options {
    /// `kubelet` options.
    #[serde(default)]
    pub kubelet: ServiceParams,
    /// `kube-scheduler` options.
    #[serde(default)]
    pub scheduler: ServiceParams,
    /// `kube-controller-manager` options.
    #[serde(default)]
    pub controller_manager: ServiceParams,
    /// `kube-apiserver` options.
    #[serde(default)]
    pub api_server: ServiceParams,
    /// `kube-proxy` options.
    #[serde(default)]
    pub proxy: ServiceParams,
}

/// etcd backup configuration; consumed by an external backup operator, not
/// by the decision engine itself. Carried here only so `Cluster` models the
/// full YAML schema from `spec.md` §6.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EtcdBackupConfig {
    /// Whether periodic etcd backups are enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Cron-style schedule for backups.
    #[serde(default)]
    pub schedule: String,
}

/// Reboot operation configuration, consumed alongside
/// `Constraints::maximum_unreachable_nodes_for_reboot`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RebootConfig {
    /// Command used to reboot a node remotely.
    #[serde(default)]
    pub reboot_command: Vec<String>,
    /// Command used to check whether a node has finished booting.
    #[serde(default)]
    pub boot_check_command: Vec<String>,
}

/// The declared cluster intent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Cluster {
    /// Cluster name.
    pub name: String,
    /// Declared nodes.
    pub nodes: Vec<Node>,
    /// Subnet from which Kubernetes Service ClusterIPs are allocated.
    pub service_subnet: IpNetwork,
    /// Subnet from which Pod IPs are allocated.
    pub pod_subnet: IpNetwork,
    /// Upstream DNS servers.
    #[serde(default)]
    pub dns_servers: Vec<String>,
    /// In-cluster DNS service address.
    pub dns_service: String,
    /// Per-service configuration options.
    #[serde(default)]
    pub options: Options,
    /// Optional etcd backup configuration.
    #[serde(default)]
    pub etcd_backup: Option<EtcdBackupConfig>,
    /// Optional reboot operation configuration.
    #[serde(default)]
    pub reboot: Option<RebootConfig>,
}

impl Cluster {
    /// Validate the invariants documented in `spec.md` §3 and §4.6:
    /// non-empty name, unique node addresses, at least one control-plane
    /// node.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ReconcileError::Validation("cluster name is empty".into()));
        }

        let mut seen = BTreeSet::new();
        for n in &self.nodes {
            if !seen.insert(n.address.clone()) {
                return Err(ReconcileError::Validation(format!(
                    "duplicate node address: {}",
                    n.address
                )));
            }
        }

        if !self.nodes.iter().any(|n| n.control_plane) {
            return Err(ReconcileError::Validation(
                "cluster must have at least one control plane node".into(),
            ));
        }

        Ok(())
    }

    /// Control-plane nodes, in declaration order.
    pub fn control_plane_nodes(&self) -> Vec<&Node> {
        self.nodes.iter().filter(|n| n.control_plane).collect()
    }

    /// Worker (non control-plane) nodes, in declaration order.
    pub fn worker_nodes(&self) -> Vec<&Node> {
        self.nodes.iter().filter(|n| !n.control_plane).collect()
    }

    /// All node addresses, ascending, for deterministic iteration (§4.4 tie-break).
    pub fn sorted_addresses(&self) -> Vec<String> {
        let mut addrs: Vec<String> = self.nodes.iter().map(|n| n.address.clone()).collect();
        addrs.sort();
        addrs
    }
}

/// Last-known running state and rendered configuration of one service on
/// one node.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// Whether the service's container is currently running.
    pub running: bool,
    /// Last-known rendered configuration, treated as opaque bytes; compared
    /// by value to detect drift.
    #[serde(default)]
    pub config: Vec<u8>,
}

/// Per-node, per-service observed status.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NodeStatus {
    /// Rivers (local L4 proxy to apiservers) status.
    #[serde(default)]
    pub rivers: ServiceStatus,
    /// kube-apiserver status.
    #[serde(default)]
    pub api_server: ServiceStatus,
    /// kube-controller-manager status.
    #[serde(default)]
    pub controller_manager: ServiceStatus,
    /// kube-scheduler status.
    #[serde(default)]
    pub scheduler: ServiceStatus,
    /// kubelet status.
    #[serde(default)]
    pub kubelet: ServiceStatus,
    /// kube-proxy status.
    #[serde(default)]
    pub proxy: ServiceStatus,
    /// etcd status.
    #[serde(default)]
    pub etcd: ServiceStatus,
    /// Whether the node's etcd member is reported healthy by the etcd
    /// cluster itself (distinct from the container merely running).
    #[serde(default)]
    pub etcd_member_healthy: bool,
}

/// The observed live state of a fleet of machines.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterStatus {
    /// Per-node observed status, keyed by address.
    pub node_statuses: BTreeMap<String, NodeStatus>,
}

impl ClusterStatus {
    /// Observed status for a given address, if any was collected during the
    /// most recent probe.
    pub fn node(&self, address: &str) -> Option<&NodeStatus> {
        self.node_statuses.get(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn test_cluster() -> Cluster {
        Cluster {
            name: "test".into(),
            nodes: vec![Node::new("10.0.0.11", true), Node::new("10.0.0.14", false)],
            service_subnet: IpNetwork::from_str("10.50.0.0/16").unwrap(),
            pod_subnet: IpNetwork::from_str("10.200.0.0/16").unwrap(),
            dns_servers: vec!["8.8.8.8".into()],
            dns_service: "10.50.0.10".into(),
            options: Options::default(),
            etcd_backup: None,
            reboot: None,
        }
    }

    #[test]
    fn validate_accepts_well_formed_cluster() {
        assert!(test_cluster().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_name() {
        let mut c = test_cluster();
        c.name = "".into();
        assert!(c.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_addresses() {
        let mut c = test_cluster();
        c.nodes.push(Node::new("10.0.0.11", false));
        assert!(c.validate().is_err());
    }

    #[test]
    fn validate_rejects_no_control_plane() {
        let mut c = test_cluster();
        for n in &mut c.nodes {
            n.control_plane = false;
        }
        assert!(c.validate().is_err());
    }

    #[test]
    fn sorted_addresses_is_ascending() {
        let c = test_cluster();
        assert_eq!(c.sorted_addresses(), vec!["10.0.0.11", "10.0.0.14"]);
    }
}
