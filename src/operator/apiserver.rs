//! kube-apiserver: requires Rivers up first (§4.4 phase order).
use super::{Operator, StepList};
use crate::{
    commander::{Commander, RunContainerOptions, Target},
    node::Node,
};

const IMAGE: &str = "kube-apiserver";
const CONTAINER_NAME: &str = "kube-apiserver";
const LOG_DIR: &str = "/var/log/kubernetes/apiserver";

/// Bring the API server up on every control-plane node in `targets`
/// (§4.3 #2): image-pull → mkdir log dir → run-container, ascending by
/// address.
pub fn bootstrap(targets: &[&Node]) -> impl Operator {
    let mut addrs: Vec<&Node> = targets.to_vec();
    addrs.sort_by(|a, b| a.address.cmp(&b.address));

    let mut steps = vec![
        Commander::ImagePull {
            target: Target::Label("apiserver".into()),
            image: IMAGE.into(),
        },
        Commander::MkDir {
            target: Target::Label("apiserver".into()),
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
        "bootstrap-apiserver",
        addrs.iter().map(|n| n.address.clone()).collect(),
        steps,
    )
}

/// Stop the API server on nodes where it should not run. Stateless sidecar:
/// no file removal.
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
        "stop-apiserver",
        addrs.iter().map(|n| n.address.clone()).collect(),
        steps,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::drain;

    #[test]
    fn bootstrap_matches_canonical_ordering() {
        let n = Node::new("10.0.0.11", true);
        let mut op = bootstrap(&[&n]);
        let cmds = drain(&mut op);
        assert_eq!(
            cmds.iter().map(|c| c.name()).collect::<Vec<_>>(),
            vec!["image-pull", "mkdir", "run-container"]
        );
    }
}
