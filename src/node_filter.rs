//! C1: classify declared nodes by role × observed liveness.
//!
//! `NodeFilter` is a pure derivation over `(Cluster, ClusterStatus)` — it is
//! recomputed fresh every decision cycle rather than cached (§9).
use crate::{
    cluster::{Cluster, ClusterStatus, ServiceStatus},
    node::Node,
};
use std::collections::BTreeMap;

/// Which nodes a service is expected to run on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Placement {
    /// Only control-plane nodes.
    ControlPlaneOnly,
    /// Every declared node.
    AllNodes,
}

/// Classifies the declared node set against observed status for a single
/// service.
pub struct NodeFilter<'a> {
    cluster: &'a Cluster,
    status: &'a ClusterStatus,
}

impl<'a> NodeFilter<'a> {
    /// Build a filter over the given snapshots.
    pub fn new(cluster: &'a Cluster, status: &'a ClusterStatus) -> Self {
        Self { cluster, status }
    }

    fn nodes_for(&self, placement: Placement) -> Vec<&'a Node> {
        match placement {
            Placement::ControlPlaneOnly => self.cluster.control_plane_nodes(),
            Placement::AllNodes => self.cluster.nodes.iter().collect(),
        }
    }

    fn running(
        &self,
        placement: Placement,
        get: impl Fn(&crate::cluster::NodeStatus) -> &ServiceStatus,
    ) -> Vec<&'a Node> {
        self.nodes_for(placement)
            .into_iter()
            .filter(|n| {
                self.status
                    .node(&n.address)
                    .map(|s| get(s).running)
                    .unwrap_or(false)
            })
            .collect()
    }

    fn stopped(
        &self,
        placement: Placement,
        get: impl Fn(&crate::cluster::NodeStatus) -> &ServiceStatus,
    ) -> Vec<&'a Node> {
        self.nodes_for(placement)
            .into_iter()
            .filter(|n| {
                !self
                    .status
                    .node(&n.address)
                    .map(|s| get(s).running)
                    .unwrap_or(false)
            })
            .collect()
    }

    fn extraneous(
        &self,
        placement: Placement,
        get: impl Fn(&crate::cluster::NodeStatus) -> &ServiceStatus,
    ) -> Vec<&'a Node> {
        let expected: Vec<&str> = self
            .nodes_for(placement)
            .into_iter()
            .map(|n| n.address.as_str())
            .collect();
        self.cluster
            .nodes
            .iter()
            .filter(|n| !expected.contains(&n.address.as_str()))
            .filter(|n| {
                self.status
                    .node(&n.address)
                    .map(|s| get(s).running)
                    .unwrap_or(false)
            })
            .collect()
    }

    fn outdated(
        &self,
        placement: Placement,
        get: impl Fn(&crate::cluster::NodeStatus) -> &ServiceStatus,
        intended: &BTreeMap<String, Vec<u8>>,
    ) -> Vec<&'a Node> {
        self.nodes_for(placement)
            .into_iter()
            .filter(|n| {
                self.status
                    .node(&n.address)
                    .map(|s| {
                        let svc = get(s);
                        svc.running
                            && intended
                                .get(&n.address)
                                .is_some_and(|want| want != &svc.config)
                    })
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Nodes on which Rivers is currently running.
    pub fn rivers_running_nodes(&self) -> Vec<&'a Node> {
        self.running(Placement::AllNodes, |s| &s.rivers)
    }
    /// Nodes on which Rivers should run but does not.
    pub fn rivers_stopped_nodes(&self) -> Vec<&'a Node> {
        self.stopped(Placement::AllNodes, |s| &s.rivers)
    }
    /// Nodes running Rivers that should not be.
    pub fn rivers_extraneous_nodes(&self) -> Vec<&'a Node> {
        self.extraneous(Placement::AllNodes, |s| &s.rivers)
    }
    /// Nodes running Rivers with a config digest that differs from intended.
    pub fn rivers_outdated_nodes(&self, intended: &BTreeMap<String, Vec<u8>>) -> Vec<&'a Node> {
        self.outdated(Placement::AllNodes, |s| &s.rivers, intended)
    }

    /// Nodes on which the API server is currently running.
    pub fn api_server_running_nodes(&self) -> Vec<&'a Node> {
        self.running(Placement::ControlPlaneOnly, |s| &s.api_server)
    }
    /// Control-plane nodes where the API server should run but does not.
    pub fn api_server_stopped_nodes(&self) -> Vec<&'a Node> {
        self.stopped(Placement::ControlPlaneOnly, |s| &s.api_server)
    }
    /// Nodes running the API server that should not be.
    pub fn api_server_extraneous_nodes(&self) -> Vec<&'a Node> {
        self.extraneous(Placement::ControlPlaneOnly, |s| &s.api_server)
    }
    /// Nodes running the API server with outdated configuration.
    pub fn api_server_outdated_nodes(&self, intended: &BTreeMap<String, Vec<u8>>) -> Vec<&'a Node> {
        self.outdated(Placement::ControlPlaneOnly, |s| &s.api_server, intended)
    }

    /// Nodes on which the controller-manager is currently running.
    pub fn controller_manager_running_nodes(&self) -> Vec<&'a Node> {
        self.running(Placement::ControlPlaneOnly, |s| &s.controller_manager)
    }
    /// Control-plane nodes where the controller-manager should run but does
    /// not.
    pub fn controller_manager_stopped_nodes(&self) -> Vec<&'a Node> {
        self.stopped(Placement::ControlPlaneOnly, |s| &s.controller_manager)
    }
    /// Nodes running the controller-manager that should not be.
    pub fn controller_manager_extraneous_nodes(&self) -> Vec<&'a Node> {
        self.extraneous(Placement::ControlPlaneOnly, |s| &s.controller_manager)
    }
    /// Nodes running the controller-manager with outdated configuration.
    pub fn controller_manager_outdated_nodes(
        &self,
        intended: &BTreeMap<String, Vec<u8>>,
    ) -> Vec<&'a Node> {
        self.outdated(
            Placement::ControlPlaneOnly,
            |s| &s.controller_manager,
            intended,
        )
    }

    /// Nodes on which the scheduler is currently running.
    pub fn scheduler_running_nodes(&self) -> Vec<&'a Node> {
        self.running(Placement::ControlPlaneOnly, |s| &s.scheduler)
    }
    /// Control-plane nodes where the scheduler should run but does not.
    pub fn scheduler_stopped_nodes(&self) -> Vec<&'a Node> {
        self.stopped(Placement::ControlPlaneOnly, |s| &s.scheduler)
    }
    /// Nodes running the scheduler that should not be.
    pub fn scheduler_extraneous_nodes(&self) -> Vec<&'a Node> {
        self.extraneous(Placement::ControlPlaneOnly, |s| &s.scheduler)
    }
    /// Nodes running the scheduler with outdated configuration.
    pub fn scheduler_outdated_nodes(&self, intended: &BTreeMap<String, Vec<u8>>) -> Vec<&'a Node> {
        self.outdated(Placement::ControlPlaneOnly, |s| &s.scheduler, intended)
    }

    /// Nodes on which kubelet is currently running.
    pub fn kubelet_running_nodes(&self) -> Vec<&'a Node> {
        self.running(Placement::AllNodes, |s| &s.kubelet)
    }
    /// Nodes where kubelet should run but does not.
    pub fn kubelet_stopped_nodes(&self) -> Vec<&'a Node> {
        self.stopped(Placement::AllNodes, |s| &s.kubelet)
    }
    /// Nodes running kubelet with outdated configuration.
    pub fn kubelet_outdated_nodes(&self, intended: &BTreeMap<String, Vec<u8>>) -> Vec<&'a Node> {
        self.outdated(Placement::AllNodes, |s| &s.kubelet, intended)
    }

    /// Nodes on which kube-proxy is currently running.
    pub fn proxy_running_nodes(&self) -> Vec<&'a Node> {
        self.running(Placement::AllNodes, |s| &s.proxy)
    }
    /// Nodes where kube-proxy should run but does not.
    pub fn proxy_stopped_nodes(&self) -> Vec<&'a Node> {
        self.stopped(Placement::AllNodes, |s| &s.proxy)
    }
    /// Nodes running kube-proxy with outdated configuration.
    pub fn proxy_outdated_nodes(&self, intended: &BTreeMap<String, Vec<u8>>) -> Vec<&'a Node> {
        self.outdated(Placement::AllNodes, |s| &s.proxy, intended)
    }

    /// Nodes on which etcd is currently running.
    pub fn etcd_running_nodes(&self) -> Vec<&'a Node> {
        self.running(Placement::ControlPlaneOnly, |s| &s.etcd)
    }
    /// Control-plane nodes where etcd should run but does not.
    pub fn etcd_stopped_nodes(&self) -> Vec<&'a Node> {
        self.stopped(Placement::ControlPlaneOnly, |s| &s.etcd)
    }

    /// Whether a quorum of control-plane etcd members are running and
    /// healthy.
    pub fn etcd_is_good(&self) -> bool {
        let cps = self.cluster.control_plane_nodes();
        if cps.is_empty() {
            return false;
        }
        let healthy = cps
            .iter()
            .filter(|n| {
                self.status
                    .node(&n.address)
                    .map(|s| s.etcd.running && s.etcd_member_healthy)
                    .unwrap_or(false)
            })
            .count();
        healthy * 2 > cps.len()
    }

    /// Union of outdated nodes across every service, keyed by each
    /// service's own intended-config map. Used by the reconciliation
    /// loop's logging, not by the decision engine itself (which consults
    /// per-service outdated sets one phase at a time).
    pub fn outdated_nodes_overall(&self, intended: &IntendedConfigs) -> Vec<&'a Node> {
        let mut seen = BTreeMap::new();
        for n in self
            .rivers_outdated_nodes(&intended.rivers)
            .into_iter()
            .chain(self.api_server_outdated_nodes(&intended.api_server))
            .chain(self.controller_manager_outdated_nodes(&intended.controller_manager))
            .chain(self.scheduler_outdated_nodes(&intended.scheduler))
            .chain(self.kubelet_outdated_nodes(&intended.kubelet))
            .chain(self.proxy_outdated_nodes(&intended.proxy))
        {
            seen.insert(n.address.clone(), n);
        }
        seen.into_values().collect()
    }
}

/// Per-service intended-config digests, as consulted by
/// `NodeFilter::outdated_nodes_overall`.
#[derive(Clone, Debug, Default)]
pub struct IntendedConfigs {
    /// Rivers intended config, keyed by node address.
    pub rivers: BTreeMap<String, Vec<u8>>,
    /// API server intended config, keyed by node address.
    pub api_server: BTreeMap<String, Vec<u8>>,
    /// Controller-manager intended config, keyed by node address.
    pub controller_manager: BTreeMap<String, Vec<u8>>,
    /// Scheduler intended config, keyed by node address.
    pub scheduler: BTreeMap<String, Vec<u8>>,
    /// Kubelet intended config, keyed by node address.
    pub kubelet: BTreeMap<String, Vec<u8>>,
    /// kube-proxy intended config, keyed by node address.
    pub proxy: BTreeMap<String, Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::NodeStatus;

    fn cluster() -> Cluster {
        use ipnetwork::IpNetwork;
        use std::str::FromStr;
        Cluster {
            name: "c".into(),
            nodes: vec![
                Node::new("10.0.0.11", true),
                Node::new("10.0.0.12", true),
                Node::new("10.0.0.13", true),
                Node::new("10.0.0.14", false),
            ],
            service_subnet: IpNetwork::from_str("10.50.0.0/16").unwrap(),
            pod_subnet: IpNetwork::from_str("10.200.0.0/16").unwrap(),
            dns_servers: vec![],
            dns_service: "10.50.0.10".into(),
            options: Default::default(),
            etcd_backup: None,
            reboot: None,
        }
    }

    #[test]
    fn rivers_stopped_nodes_includes_all_nodes_when_nothing_running() {
        let c = cluster();
        let s = ClusterStatus::default();
        let f = NodeFilter::new(&c, &s);
        assert_eq!(f.rivers_stopped_nodes().len(), 4);
        assert_eq!(f.api_server_stopped_nodes().len(), 3);
    }

    #[test]
    fn extraneous_detects_stray_running_service_on_worker() {
        let c = cluster();
        let mut s = ClusterStatus::default();
        let mut ns = NodeStatus::default();
        ns.api_server.running = true;
        s.node_statuses.insert("10.0.0.14".into(), ns);
        let f = NodeFilter::new(&c, &s);
        let extra = f.api_server_extraneous_nodes();
        assert_eq!(extra.len(), 1);
        assert_eq!(extra[0].address, "10.0.0.14");
    }

    #[test]
    fn etcd_is_good_requires_majority() {
        let c = cluster();
        let mut s = ClusterStatus::default();
        for addr in ["10.0.0.11", "10.0.0.12"] {
            let mut ns = NodeStatus::default();
            ns.etcd.running = true;
            ns.etcd_member_healthy = true;
            s.node_statuses.insert(addr.into(), ns);
        }
        let f = NodeFilter::new(&c, &s);
        assert!(f.etcd_is_good());

        let mut s2 = ClusterStatus::default();
        let mut ns = NodeStatus::default();
        ns.etcd.running = true;
        ns.etcd_member_healthy = true;
        s2.node_statuses.insert("10.0.0.11".into(), ns);
        let f2 = NodeFilter::new(&c, &s2);
        assert!(!f2.etcd_is_good());
    }

    #[test]
    fn outdated_nodes_requires_running_and_digest_mismatch() {
        let c = cluster();
        let mut s = ClusterStatus::default();
        let mut ns = NodeStatus::default();
        ns.kubelet.running = true;
        ns.kubelet.config = b"old".to_vec();
        s.node_statuses.insert("10.0.0.11".into(), ns);
        let f = NodeFilter::new(&c, &s);

        let mut intended = BTreeMap::new();
        intended.insert("10.0.0.11".to_string(), b"new".to_vec());
        assert_eq!(f.kubelet_outdated_nodes(&intended).len(), 1);

        intended.insert("10.0.0.11".to_string(), b"old".to_vec());
        assert_eq!(f.kubelet_outdated_nodes(&intended).len(), 0);
    }
}
