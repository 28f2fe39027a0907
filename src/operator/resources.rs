//! Resource application: phase 8 of the decision engine (§4.4). Declared
//! Kubernetes resources (raw manifests, keyed `<kind>/<namespace>/<name>`
//! per §6's persisted-state layout) are installed the same way the
//! CoreDNS addon is — written to a control-plane node, then applied by the
//! executor's `KubernetesClient` once in place.
use super::{Operator, StepList};
use crate::{
    commander::{Commander, Target},
    node::Node,
};

const RESOURCE_DIR: &str = "/etc/kubernetes/resources";

/// One declared resource pending application.
pub struct PendingResource<'a> {
    /// `<kind>/<namespace>/<name>` key from the persisted-state layout.
    pub key: &'a str,
    /// Raw manifest bytes.
    pub manifest: Vec<u8>,
}

/// Install every pending resource onto `master`, ascending by key for
/// determinism.
pub fn apply(master: &Node, mut pending: Vec<PendingResource<'_>>) -> impl Operator {
    pending.sort_by(|a, b| a.key.cmp(b.key));

    let steps = pending
        .into_iter()
        .map(|r| Commander::MakeFile {
            target: Target::Node(master.address.clone()),
            path: format!("{}/{}.yml", RESOURCE_DIR, r.key),
            content: r.manifest,
            mode: 0o644,
        })
        .collect();

    StepList::new("apply-resources", vec![master.address.clone()], steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::drain;

    #[test]
    fn apply_installs_in_ascending_key_order() {
        let master = Node::new("10.0.0.11", true);
        let pending = vec![
            PendingResource {
                key: "configmap/kube-system/z",
                manifest: b"z".to_vec(),
            },
            PendingResource {
                key: "configmap/kube-system/a",
                manifest: b"a".to_vec(),
            },
        ];
        let mut op = apply(&master, pending);
        let cmds = drain(&mut op);
        match &cmds[0] {
            Commander::MakeFile { path, .. } => assert!(path.ends_with("a.yml")),
            _ => panic!("expected make-file"),
        }
        match &cmds[1] {
            Commander::MakeFile { path, .. } => assert!(path.ends_with("z.yml")),
            _ => panic!("expected make-file"),
        }
    }
}
