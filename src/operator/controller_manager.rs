//! kube-controller-manager: needs its kubeconfig installed before it can run
//! (§4.3 #3).
use super::{Operator, StepList};
use crate::{
    commander::{Commander, RunContainerOptions, Target},
    node::Node,
};

const IMAGE: &str = "kube-controller-manager";
const CONTAINER_NAME: &str = "kube-controller-manager";
const LOG_DIR: &str = "/var/log/kubernetes/controller-manager";
const KUBECONFIG_PATH: &str = "/etc/kubernetes/controller-manager/kubeconfig";

/// Bring the controller-manager up on every control-plane node in `targets`
/// (§4.3 #3): make-file kubeconfig → image-pull → mkdir log dir →
/// run-container, ascending by address.
pub fn bootstrap(targets: &[&Node], kubeconfig: &[u8]) -> impl Operator {
    let mut addrs: Vec<&Node> = targets.to_vec();
    addrs.sort_by(|a, b| a.address.cmp(&b.address));

    let mut steps = Vec::new();
    for n in &addrs {
        steps.push(Commander::MakeFile {
            target: Target::Node(n.address.clone()),
            path: KUBECONFIG_PATH.into(),
            content: kubeconfig.to_vec(),
            mode: 0o600,
        });
    }
    steps.push(Commander::ImagePull {
        target: Target::Label("controller-manager".into()),
        image: IMAGE.into(),
    });
    steps.push(Commander::MkDir {
        target: Target::Label("controller-manager".into()),
        path: LOG_DIR.into(),
        mode: 0o755,
    });
    for n in &addrs {
        steps.push(Commander::RunContainer {
            target: Target::Node(n.address.clone()),
            name: CONTAINER_NAME.into(),
            image: IMAGE.into(),
            options: RunContainerOptions {
                extra_binds: vec![format!("{}:{}", KUBECONFIG_PATH, KUBECONFIG_PATH)],
                ..Default::default()
            },
        });
    }

    StepList::new(
        "bootstrap-controller-manager",
        addrs.iter().map(|n| n.address.clone()).collect(),
        steps,
    )
}

/// Remove the kubeconfig, then stop the controller-manager on nodes where
/// it should not run (§8: a single `rm` ahead of the `stop-container`s,
/// preventing a stale config from being picked up by an accidental
/// restart).
pub fn stop(targets: &[&Node]) -> impl Operator {
    let mut addrs: Vec<&Node> = targets.to_vec();
    addrs.sort_by(|a, b| a.address.cmp(&b.address));

    let mut steps = vec![Commander::Remove {
        target: Target::Label("controller-manager".into()),
        path: KUBECONFIG_PATH.into(),
    }];
    for n in &addrs {
        steps.push(Commander::StopContainer {
            target: Target::Node(n.address.clone()),
            name: CONTAINER_NAME.into(),
        });
    }

    StepList::new(
        "stop-controller-manager",
        addrs.iter().map(|n| n.address.clone()).collect(),
        steps,
    )
}
