//! End-to-end `decide_ops` scenarios over a 3 control-plane / 2 worker
//! cluster, ported from the bootstrap/teardown table this engine's
//! phase ordering is modeled on: each case declares a cluster and an
//! observed status, then asserts the exact ordered command sequence one
//! `decide_ops` call returns.
use cke_core::{
    cluster::{ClusterStatus, NodeStatus, Options, ServiceStatus},
    node::Node,
    operator::drain,
    strategy::{decide_ops, DecisionInputs},
    Cluster,
};
use ipnetwork::IpNetwork;
use std::collections::BTreeMap;
use std::str::FromStr;

const CP_NODES: [&str; 3] = ["10.0.0.11", "10.0.0.12", "10.0.0.13"];
const WORKER_NODES: [&str; 2] = ["10.0.0.14", "10.0.0.15"];

fn cluster() -> Cluster {
    let mut nodes: Vec<Node> = CP_NODES.iter().map(|a| Node::new(*a, true)).collect();
    nodes.extend(WORKER_NODES.iter().map(|a| Node::new(*a, false)));
    Cluster {
        name: "test".into(),
        nodes,
        service_subnet: IpNetwork::from_str("10.50.0.0/16").unwrap(),
        pod_subnet: IpNetwork::from_str("10.200.0.0/16").unwrap(),
        dns_servers: vec!["8.8.8.8".into()],
        dns_service: "10.50.0.10".into(),
        options: Options::default(),
        etcd_backup: None,
        reboot: None,
    }
}

/// Status with etcd already healthy on every control plane and, for each
/// `running` service name, that service marked running on every node it is
/// placed on. This is the baseline every bootstrap/stop case starts from so
/// phases 1-n before the one under test never fire.
fn status_with_etcd_and(already_running: &[&str]) -> ClusterStatus {
    let mut status = ClusterStatus::default();
    for addr in CP_NODES {
        let mut ns = NodeStatus::default();
        ns.etcd = ServiceStatus {
            running: true,
            config: vec![],
        };
        ns.etcd_member_healthy = true;
        status.node_statuses.insert(addr.into(), ns);
    }
    for name in already_running {
        let addrs: Vec<&str> = match *name {
            "rivers" => CP_NODES.iter().chain(WORKER_NODES.iter()).copied().collect(),
            "apiserver" | "controller_manager" | "scheduler" => CP_NODES.to_vec(),
            other => panic!("unknown service {other}"),
        };
        for addr in addrs {
            let ns = status.node_statuses.entry(addr.to_string()).or_default();
            let svc = ServiceStatus {
                running: true,
                config: vec![],
            };
            match *name {
                "rivers" => ns.rivers = svc,
                "apiserver" => ns.api_server = svc,
                "controller_manager" => ns.controller_manager = svc,
                "scheduler" => ns.scheduler = svc,
                _ => unreachable!(),
            }
        }
    }
    status
}

fn inputs(master: &Node) -> DecisionInputs<'_> {
    DecisionInputs {
        intended: Default::default(),
        controller_manager_kubeconfig: b"cm-kubeconfig".to_vec(),
        scheduler_kubeconfig: b"scheduler-kubeconfig".to_vec(),
        kubelet_assets: BTreeMap::new(),
        coredns_manifest: Vec::new(),
        resources: BTreeMap::new(),
        master,
    }
}

fn run(cluster: &Cluster, status: &ClusterStatus) -> Vec<(String, String)> {
    let master = cluster.control_plane_nodes()[0].clone();
    let in_ = inputs(&master);
    let mut ops = decide_ops(cluster, status, &in_);
    assert_eq!(ops.len(), 1, "expected exactly one operator per decide_ops call");
    drain(ops[0].as_mut())
        .into_iter()
        .map(|c| (c.name().to_string(), c.target().display()))
        .collect()
}

#[test]
fn bootstrap_rivers() {
    let c = cluster();
    let status = status_with_etcd_and(&[]);
    let cmds = run(&c, &status);

    assert_eq!(cmds[0], ("image-pull".into(), "rivers".into()));
    assert_eq!(cmds[1], ("mkdir".into(), "rivers".into()));
    let run_cmds = &cmds[2..];
    assert_eq!(run_cmds.len(), 5);
    assert!(run_cmds.iter().all(|(name, _)| name == "run-container"));
    let mut targets: Vec<&str> = run_cmds.iter().map(|(_, t)| t.as_str()).collect();
    let mut expected: Vec<&str> = CP_NODES.iter().chain(WORKER_NODES.iter()).copied().collect();
    targets.sort();
    expected.sort();
    assert_eq!(targets, expected);
}

#[test]
fn bootstrap_apiserver() {
    let c = cluster();
    let status = status_with_etcd_and(&["rivers"]);
    let cmds = run(&c, &status);

    assert_eq!(cmds[0], ("image-pull".into(), "apiserver".into()));
    assert_eq!(cmds[1], ("mkdir".into(), "apiserver".into()));
    let mut targets: Vec<&str> = cmds[2..].iter().map(|(_, t)| t.as_str()).collect();
    targets.sort();
    assert_eq!(targets, CP_NODES.to_vec());
}

#[test]
fn bootstrap_controller_manager_writes_kubeconfig_before_running() {
    let c = cluster();
    let status = status_with_etcd_and(&["rivers", "apiserver"]);
    let cmds = run(&c, &status);

    assert_eq!(&cmds[0].0, "make-file");
    assert_eq!(&cmds[1].0, "make-file");
    assert_eq!(&cmds[2].0, "make-file");
    assert_eq!(&cmds[3], &("image-pull".to_string(), "controller-manager".to_string()));
    assert_eq!(&cmds[4], &("mkdir".to_string(), "controller-manager".to_string()));
    assert!(cmds[5..].iter().all(|(name, _)| name == "run-container"));
}

#[test]
fn bootstrap_scheduler_writes_kubeconfig_before_running() {
    let c = cluster();
    let status = status_with_etcd_and(&["rivers", "apiserver", "controller_manager"]);
    let cmds = run(&c, &status);

    assert_eq!(&cmds[0].0, "make-file");
    assert_eq!(&cmds[3], &("image-pull".to_string(), "scheduler".to_string()));
    assert_eq!(&cmds[4], &("mkdir".to_string(), "scheduler".to_string()));
    assert!(cmds[5..].iter().all(|(name, _)| name == "run-container"));
}

fn fully_bootstrapped_status() -> ClusterStatus {
    let mut status = status_with_etcd_and(&["rivers", "apiserver", "controller_manager", "scheduler"]);
    for addr in CP_NODES.iter().chain(WORKER_NODES.iter()) {
        let ns = status.node_statuses.entry((*addr).to_string()).or_default();
        ns.kubelet = ServiceStatus {
            running: true,
            config: vec![],
        };
        ns.proxy = ServiceStatus {
            running: true,
            config: vec![],
        };
    }
    status
}

#[test]
fn stop_apiserver_on_extraneous_node() {
    // Rivers runs on every declared node by placement, so it has no
    // "extraneous" set to detect (§4.3); the API server, which is
    // control-plane-only, is the stateless stand-in for the table's
    // "stop" cases here.
    let c = cluster();
    let mut status = fully_bootstrapped_status();
    for addr in WORKER_NODES {
        let ns = status.node_statuses.get_mut(addr).unwrap();
        ns.api_server = ServiceStatus {
            running: true,
            config: vec![],
        };
    }
    let cmds = run(&c, &status);
    assert_eq!(cmds.len(), 2);
    assert!(cmds.iter().all(|(name, _)| name == "stop-container"));
    let mut targets: Vec<&str> = cmds.iter().map(|(_, t)| t.as_str()).collect();
    targets.sort();
    assert_eq!(targets, WORKER_NODES.to_vec());
}

#[test]
fn stop_controller_manager_removes_kubeconfig_before_stopping() {
    let c = cluster();
    let mut status = fully_bootstrapped_status();
    for addr in WORKER_NODES {
        let ns = status.node_statuses.get_mut(addr).unwrap();
        ns.controller_manager = ServiceStatus {
            running: true,
            config: vec![],
        };
    }
    let cmds = run(&c, &status);
    assert_eq!(cmds.len(), 3);
    assert_eq!(&cmds[0].0, "rm");
    assert_eq!(&cmds[1].0, "stop-container");
    assert_eq!(&cmds[2].0, "stop-container");
}

#[test]
fn stop_scheduler_removes_kubeconfig_before_stopping() {
    let c = cluster();
    let mut status = fully_bootstrapped_status();
    for addr in WORKER_NODES {
        let ns = status.node_statuses.get_mut(addr).unwrap();
        ns.scheduler = ServiceStatus {
            running: true,
            config: vec![],
        };
    }
    let cmds = run(&c, &status);
    assert_eq!(cmds.len(), 3);
    assert_eq!(&cmds[0].0, "rm");
    assert_eq!(&cmds[1].0, "stop-container");
    assert_eq!(&cmds[2].0, "stop-container");
}

#[test]
fn fully_reconciled_cluster_yields_no_operators() {
    let c = cluster();
    let status = fully_bootstrapped_status();
    let master = c.control_plane_nodes()[0].clone();
    let in_ = inputs(&master);
    let ops = decide_ops(&c, &status, &in_);
    assert!(ops.is_empty());
}
