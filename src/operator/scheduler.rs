//! kube-scheduler: same kubeconfig-first shape as the controller-manager
//! (§4.3 #4).
use super::{Operator, StepList};
use crate::{
    commander::{Commander, RunContainerOptions, Target},
    node::Node,
};

const IMAGE: &str = "kube-scheduler";
const CONTAINER_NAME: &str = "kube-scheduler";
const LOG_DIR: &str = "/var/log/kubernetes/scheduler";
const KUBECONFIG_PATH: &str = "/etc/kubernetes/scheduler/kubeconfig";

/// Bring the scheduler up on every control-plane node in `targets` (§4.3
/// #4): make-file kubeconfig → image-pull → mkdir log dir → run-container,
/// ascending by address.
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
        target: Target::Label("scheduler".into()),
        image: IMAGE.into(),
    });
    steps.push(Commander::MkDir {
        target: Target::Label("scheduler".into()),
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
        "bootstrap-scheduler",
        addrs.iter().map(|n| n.address.clone()).collect(),
        steps,
    )
}

/// Remove the kubeconfig, then stop the scheduler on nodes where it should
/// not run (§8: a single `rm` ahead of the `stop-container`s, preventing a
/// stale config from being picked up by an accidental restart).
pub fn stop(targets: &[&Node]) -> impl Operator {
    let mut addrs: Vec<&Node> = targets.to_vec();
    addrs.sort_by(|a, b| a.address.cmp(&b.address));

    let mut steps = vec![Commander::Remove {
        target: Target::Label("scheduler".into()),
        path: KUBECONFIG_PATH.into(),
    }];
    for n in &addrs {
        steps.push(Commander::StopContainer {
            target: Target::Node(n.address.clone()),
            name: CONTAINER_NAME.into(),
        });
    }

    StepList::new(
        "stop-scheduler",
        addrs.iter().map(|n| n.address.clone()).collect(),
        steps,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::drain;

    #[test]
    fn bootstrap_writes_kubeconfig_before_running() {
        let n = Node::new("10.0.0.11", true);
        let mut op = bootstrap(&[&n], b"kubeconfig-bytes");
        let cmds = drain(&mut op);
        assert_eq!(
            cmds.iter().map(|c| c.name()).collect::<Vec<_>>(),
            vec!["make-file", "image-pull", "mkdir", "run-container"]
        );
    }

    #[test]
    fn stop_removes_kubeconfig_before_stopping() {
        let a = Node::new("10.0.0.14", false);
        let b = Node::new("10.0.0.15", false);
        let mut op = stop(&[&a, &b]);
        let cmds = drain(&mut op);
        assert_eq!(
            cmds.iter().map(|c| c.name()).collect::<Vec<_>>(),
            vec!["rm", "stop-container", "stop-container"]
        );
    }
}
