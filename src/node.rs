//! Declared cluster members and the taints/labels attached to them.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The effect a `Taint` has on scheduling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum TaintEffect {
    /// Prevent new pods from scheduling unless they tolerate the taint.
    NoSchedule,
    /// Evict running pods that do not tolerate the taint.
    NoExecute,
    /// Best-effort avoid scheduling; not a hard constraint.
    PreferNoSchedule,
}

/// A single node taint, compared as the `(key, value, effect)` triple.
///
/// Order in `Node::taints` is preserved across regeneration — rewriting
/// taints in a different order than what is already applied on the node
/// causes unnecessary churn (see `spec.md` §9).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taint {
    /// Taint key, e.g. `cke.cybozu.com/state`.
    pub key: String,
    /// Taint value, e.g. `unhealthy`.
    pub value: String,
    /// Scheduling effect of the taint.
    pub effect: TaintEffect,
}

impl Taint {
    /// Build a new taint triple.
    pub fn new(key: impl Into<String>, value: impl Into<String>, effect: TaintEffect) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            effect,
        }
    }
}

/// A declared cluster member.
///
/// Identity is `address`; addresses must be unique within a `Cluster`
/// (enforced by `Cluster::validate`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// IPv4 address identifying the node.
    pub address: String,
    /// SSH (or equivalent remote-execution) user for this node.
    pub user: String,
    /// Whether this node hosts control-plane services
    /// (apiserver/controller-manager/scheduler/etcd).
    pub control_plane: bool,
    /// Free-form Kubernetes labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Free-form Kubernetes annotations.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Ordered taint list; order is semantically significant (see above).
    #[serde(default)]
    pub taints: Vec<Taint>,
}

impl Node {
    /// Build a bare-bones node, useful for tests and the strategy engine's
    /// internal fixtures.
    pub fn new(address: impl Into<String>, control_plane: bool) -> Self {
        Self {
            address: address.into(),
            user: String::new(),
            control_plane,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            taints: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taint_equality_ignores_nothing_but_the_triple() {
        let a = Taint::new("k", "v", TaintEffect::NoSchedule);
        let b = Taint::new("k", "v", TaintEffect::NoSchedule);
        let c = Taint::new("k", "v", TaintEffect::NoExecute);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn new_node_has_no_taints_or_labels() {
        let n = Node::new("10.0.0.11", true);
        assert!(n.control_plane);
        assert!(n.labels.is_empty());
        assert!(n.taints.is_empty());
    }
}
