//! Node labels/taints/annotations reconciliation: phase 9 of the decision
//! engine (§4.4), lowest priority — only reached once every service is
//! bootstrapped, stopped where it shouldn't run, and resources are applied.
//!
//! A diff is computed per node against the declared `Node` (labels,
//! annotations, taints all live on `Node` itself, per §3); the result is
//! written as a patch manifest and applied by the executor's
//! `KubernetesClient`, the same delegation pattern used for resource
//! application.
use super::{Operator, StepList};
use crate::{
    commander::{Commander, Target},
    node::Node,
};
use serde::Serialize;

const PATCH_DIR: &str = "/etc/kubernetes/node-meta";

/// A node whose observed labels/annotations/taints differ from `node`'s
/// declared values.
#[derive(Clone, Debug, Serialize)]
struct NodeMetaPatch<'a> {
    labels: &'a std::collections::BTreeMap<String, String>,
    annotations: &'a std::collections::BTreeMap<String, String>,
    taints: &'a [crate::node::Taint],
}

/// Returns `true` if `node`'s declared metadata differs from what is
/// currently observed on the cluster object, per `observed`.
pub fn needs_patch(node: &Node, observed: &Node) -> bool {
    node.labels != observed.labels
        || node.annotations != observed.annotations
        || node.taints != observed.taints
}

/// Reconcile metadata for every `(declared, observed)` pair where
/// `needs_patch` holds, ascending by address.
pub fn reconcile(mut pairs: Vec<(&Node, &Node)>) -> impl Operator {
    pairs.retain(|(declared, observed)| needs_patch(declared, observed));
    pairs.sort_by(|(a, _), (b, _)| a.address.cmp(&b.address));

    let steps = pairs
        .iter()
        .map(|(declared, _)| {
            let patch = NodeMetaPatch {
                labels: &declared.labels,
                annotations: &declared.annotations,
                taints: &declared.taints,
            };
            let content = serde_yml::to_string(&patch)
                .unwrap_or_default()
                .into_bytes();
            Commander::MakeFile {
                target: Target::Node(declared.address.clone()),
                path: format!("{}/{}.yml", PATCH_DIR, declared.address),
                content,
                mode: 0o644,
            }
        })
        .collect();

    StepList::new(
        "reconcile-node-meta",
        pairs.iter().map(|(d, _)| d.address.clone()).collect(),
        steps,
    )
}
