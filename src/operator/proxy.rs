//! kube-proxy: symmetric with Rivers — runs on every node, same
//! stateless-sidecar shape (§4.3 supplement).
use super::{Operator, StepList};
use crate::{
    commander::{Commander, RunContainerOptions, Target},
    node::Node,
};

const IMAGE: &str = "kube-proxy";
const CONTAINER_NAME: &str = "kube-proxy";
const LOG_DIR: &str = "/var/log/kubernetes/proxy";

/// Bring kube-proxy up on every node in `targets`: image-pull → mkdir log
/// dir → run-container per node, ascending by address.
pub fn bootstrap(targets: &[&Node]) -> impl Operator {
    let mut addrs: Vec<&Node> = targets.to_vec();
    addrs.sort_by(|a, b| a.address.cmp(&b.address));

    let mut steps = vec![
        Commander::ImagePull {
            target: Target::Label("proxy".into()),
            image: IMAGE.into(),
        },
        Commander::MkDir {
            target: Target::Label("proxy".into()),
            path: LOG_DIR.into(),
            mode: 0o755,
        },
    ];
    for n in &addrs {
        steps.push(Commander::RunContainer {
            target: Target::Node(n.address.clone()),
            name: CONTAINER_NAME.into(),
            image: IMAGE.into(),
            options: RunContainerOptions::default(),
        });
    }

    StepList::new(
        "bootstrap-proxy",
        addrs.iter().map(|n| n.address.clone()).collect(),
        steps,
    )
}

/// Stop kube-proxy on nodes where it should not run. Stateless sidecar: no
/// file removal.
pub fn stop(targets: &[&Node]) -> impl Operator {
    let mut addrs: Vec<&Node> = targets.to_vec();
    addrs.sort_by(|a, b| a.address.cmp(&b.address));

    let steps = addrs
        .iter()
        .map(|n| Commander::StopContainer {
            target: Target::Node(n.address.clone()),
            name: CONTAINER_NAME.into(),
        })
        .collect();

    StepList::new(
        "stop-proxy",
        addrs.iter().map(|n| n.address.clone()).collect(),
        steps,
    )
}
