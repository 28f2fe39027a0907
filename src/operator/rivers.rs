//! Rivers: the local L4 proxy fronting remote apiservers, run on every node.
use super::{Operator, StepList};
use crate::{
    commander::{Commander, RunContainerOptions, Target},
    node::Node,
};

const IMAGE: &str = "rivers";
const CONTAINER_NAME: &str = "rivers";
const LOG_DIR: &str = "/var/log/rivers";

/// Bring Rivers up on every node in `targets` that needs it (§4.3 #1).
///
/// Canonical ordering: image-pull → mkdir log dir → run-container per node,
/// ascending by address.
pub fn bootstrap(targets: &[&Node]) -> impl Operator {
    let mut addrs: Vec<&Node> = targets.to_vec();
    addrs.sort_by(|a, b| a.address.cmp(&b.address));

    let mut steps = vec![
        Commander::ImagePull {
            target: Target::Label("rivers".into()),
            image: IMAGE.into(),
        },
        Commander::MkDir {
            target: Target::Label("rivers".into()),
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
        "bootstrap-rivers",
        addrs.iter().map(|n| n.address.clone()).collect(),
        steps,
    )
}

/// Stop Rivers on nodes where it is running but should not be (§4.3
/// teardown). No file removal: Rivers is stateless.
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
        "stop-rivers",
        addrs.iter().map(|n| n.address.clone()).collect(),
        steps,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::drain;

    #[test]
    fn bootstrap_emits_pull_mkdir_then_run_per_node_ascending() {
        let b = Node::new("10.0.0.12", true);
        let a = Node::new("10.0.0.11", true);
        let mut op = bootstrap(&[&b, &a]);
        let cmds = drain(&mut op);
        assert_eq!(cmds[0].name(), "image-pull");
        assert_eq!(cmds[1].name(), "mkdir");
        assert_eq!(cmds[2].name(), "run-container");
        assert_eq!(cmds[2].target().display(), "10.0.0.11");
        assert_eq!(cmds[3].target().display(), "10.0.0.12");
    }

    #[test]
    fn stop_emits_one_stop_container_per_node() {
        let n14 = Node::new("10.0.0.14", false);
        let n15 = Node::new("10.0.0.15", false);
        let mut op = stop(&[&n14, &n15]);
        let cmds = drain(&mut op);
        assert_eq!(cmds.len(), 2);
        assert!(cmds.iter().all(|c| c.name() == "stop-container"));
    }
}
