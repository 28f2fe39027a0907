//! Render a `Machine` into a declared `Node`, applying the taint/label/
//! annotation rules the generator's `fill` step depends on.
use crate::{
    machine::{Machine, MachineState},
    node::{Node, Taint, TaintEffect},
};
use std::collections::BTreeMap;

/// A per-role node template: everything about a node that does not come
/// from the machine inventory (user, control-plane-ness, base labels/
/// annotations/taints the operator wants on every node of this role).
#[derive(Clone, Debug, Default)]
pub struct NodeTemplate {
    /// Remote execution user.
    pub user: String,
    /// Whether nodes built from this template are control planes.
    pub control_plane: bool,
    /// Base annotations applied before the machine-derived ones.
    pub annotations: BTreeMap<String, String>,
    /// Base labels applied before the machine-derived ones.
    pub labels: BTreeMap<String, String>,
    /// Base taints applied before the machine-state-derived one.
    pub taints: Vec<Taint>,
}

/// Build a declared `Node` from a machine and its role template, applying
/// the CKE annotation/label/taint conventions.
pub fn machine_to_node(machine: &Machine, tmpl: &NodeTemplate) -> Option<Node> {
    let address = machine.address()?.to_string();

    let mut annotations = tmpl.annotations.clone();
    annotations.insert("cke.cybozu.com/serial".into(), machine.spec.serial.clone());
    annotations.insert(
        "cke.cybozu.com/register-date".into(),
        machine.spec.register_date.to_rfc3339(),
    );
    annotations.insert(
        "cke.cybozu.com/retire-date".into(),
        machine.spec.retire_date.to_rfc3339(),
    );

    let mut labels = BTreeMap::new();
    for l in &machine.spec.labels {
        labels.insert(format!("sabakan.cke.cybozu.com/{}", l.name), l.value.clone());
    }
    for (k, v) in &tmpl.labels {
        labels.insert(k.clone(), v.clone());
    }
    labels.insert("cke.cybozu.com/rack".into(), machine.spec.rack.to_string());
    labels.insert(
        "cke.cybozu.com/index-in-rack".into(),
        machine.spec.index_in_rack.to_string(),
    );
    labels.insert("cke.cybozu.com/role".into(), machine.spec.role.clone());
    labels.insert(
        format!("node-role.kubernetes.io/{}", machine.spec.role),
        "true".into(),
    );
    if tmpl.control_plane {
        labels.insert("node-role.kubernetes.io/master".into(), "true".into());
    }
    labels.insert(
        "topology.kubernetes.io/zone".into(),
        format!("rack{}", machine.spec.rack),
    );
    labels.insert(
        "failure-domain.beta.kubernetes.io/zone".into(),
        format!("rack{}", machine.spec.rack),
    );

    let mut taints = tmpl.taints.clone();
    if let Some((value, effect)) = state_taint(machine.status.state) {
        taints.push(Taint::new("cke.cybozu.com/state", value, effect));
    }

    Some(Node {
        address,
        user: tmpl.user.clone(),
        control_plane: tmpl.control_plane,
        labels,
        annotations,
        taints,
    })
}

/// The `cke.cybozu.com/state` taint implied by a machine's lifecycle
/// state, if any.
fn state_taint(state: MachineState) -> Option<(&'static str, TaintEffect)> {
    match state {
        MachineState::Unhealthy => Some(("unhealthy", TaintEffect::NoSchedule)),
        MachineState::Unreachable => Some(("unreachable", TaintEffect::NoSchedule)),
        MachineState::Retiring => Some(("retiring", TaintEffect::NoExecute)),
        MachineState::Retired => Some(("retired", TaintEffect::NoExecute)),
        _ => None,
    }
}

/// Whether `node`'s `cke.cybozu.com/state` taint matches what
/// `state_taint` would assign for `machine`'s current state (§4.5's
/// `hasValidTaint`).
pub fn has_valid_taint(node: &Node, machine: &Machine) -> bool {
    let current = node
        .taints
        .iter()
        .find(|t| t.key == "cke.cybozu.com/state");

    match (state_taint(machine.status.state), current) {
        (Some((value, effect)), Some(t)) => t.value == value && t.effect == effect,
        (Some(_), None) => false,
        (None, Some(_)) => false,
        (None, None) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::{MachineLabel, MachineSpec, MachineStatus};
    use chrono::{TimeZone, Utc};

    fn machine(state: MachineState) -> Machine {
        Machine {
            spec: MachineSpec {
                serial: "S1".into(),
                ipv4: vec!["10.0.0.20".into()],
                rack: 3,
                index_in_rack: 1,
                role: "cs".into(),
                labels: vec![MachineLabel {
                    name: "gpu".into(),
                    value: "true".into(),
                }],
                register_date: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
                retire_date: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
            },
            status: MachineStatus {
                state,
                duration: 0.0,
            },
        }
    }

    #[test]
    fn healthy_machine_gets_no_state_taint() {
        let n = machine_to_node(&machine(MachineState::Healthy), &NodeTemplate::default()).unwrap();
        assert!(n.taints.is_empty());
        assert_eq!(n.labels["cke.cybozu.com/role"], "cs");
        assert_eq!(n.labels["cke.cybozu.com/rack"], "3");
        assert_eq!(n.labels["sabakan.cke.cybozu.com/gpu"], "true");
        assert_eq!(n.annotations["cke.cybozu.com/serial"], "S1");
    }

    #[test]
    fn unreachable_machine_gets_no_schedule_taint() {
        let n = machine_to_node(&machine(MachineState::Unreachable), &NodeTemplate::default()).unwrap();
        assert_eq!(n.taints.len(), 1);
        assert_eq!(n.taints[0].value, "unreachable");
        assert_eq!(n.taints[0].effect, TaintEffect::NoSchedule);
    }

    #[test]
    fn control_plane_template_adds_master_role_label() {
        let mut tmpl = NodeTemplate::default();
        tmpl.control_plane = true;
        let n = machine_to_node(&machine(MachineState::Healthy), &tmpl).unwrap();
        assert_eq!(n.labels["node-role.kubernetes.io/master"], "true");
    }

    #[test]
    fn has_valid_taint_detects_drift() {
        let m = machine(MachineState::Retiring);
        let n = machine_to_node(&m, &NodeTemplate::default()).unwrap();
        assert!(has_valid_taint(&n, &m));

        let mut stale = n.clone();
        stale.taints.clear();
        assert!(!has_valid_taint(&stale, &m));
    }
}
