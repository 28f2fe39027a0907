//! CoreDNS: the one cluster-level addon modeled as an `Operator` rather than
//! left entirely to generic resource application (§4.4 phase 8). Bootstrap
//! writes the rendered manifest to a control-plane node and waits for the
//! rollout; the actual `kubectl apply`-equivalent is a `KubernetesClient`
//! call the executor makes once the manifest is in place, not a `Commander`
//! kind of its own (§6).
use super::{Operator, StepList};
use crate::{
    commander::{Commander, Target, WaitPolicy},
    node::Node,
};

const MANIFEST_PATH: &str = "/etc/kubernetes/addons/coredns.yml";

/// Render and install the CoreDNS manifest on `master`, then wait for the
/// deployment to become available.
pub fn bootstrap(master: &Node, manifest: Vec<u8>) -> impl Operator {
    let steps = vec![
        Commander::MakeFile {
            target: Target::Node(master.address.clone()),
            path: MANIFEST_PATH.into(),
            content: manifest,
            mode: 0o644,
        },
        Commander::WaitReady {
            target: Target::Node(master.address.clone()),
            condition: "coredns rollout complete".into(),
            policy: WaitPolicy::default(),
        },
    ];

    StepList::new("bootstrap-coredns", vec![master.address.clone()], steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::drain;

    #[test]
    fn bootstrap_writes_manifest_then_waits() {
        let master = Node::new("10.0.0.11", true);
        let mut op = bootstrap(&master, b"apiVersion: v1".to_vec());
        let cmds = drain(&mut op);
        assert_eq!(
            cmds.iter().map(|c| c.name()).collect::<Vec<_>>(),
            vec!["make-file", "wait-ready"]
        );
    }
}
