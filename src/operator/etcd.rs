//! etcd quorum: brought up first, repaired when membership degrades (§4.4
//! phase 1, §4.3 supplement).
use super::{Operator, StepList};
use crate::{
    commander::{CertificateRole, Commander, RunContainerOptions, Target, WaitPolicy},
    node::Node,
};

const IMAGE: &str = "etcd";
const CONTAINER_NAME: &str = "etcd";
const DATA_DIR: &str = "/var/lib/etcd";

/// Bring the etcd quorum up on every control-plane node in `targets`:
/// image-pull → mkdir data dir → run-container per node → wait-ready,
/// ascending by address.
pub fn bootstrap(targets: &[&Node]) -> impl Operator {
    let mut addrs: Vec<&Node> = targets.to_vec();
    addrs.sort_by(|a, b| a.address.cmp(&b.address));

    let mut steps = vec![
        Commander::ImagePull {
            target: Target::Label("etcd".into()),
            image: IMAGE.into(),
        },
        Commander::MkDir {
            target: Target::Label("etcd".into()),
            path: DATA_DIR.into(),
            mode: 0o700,
        },
    ];
    for n in &addrs {
        steps.push(Commander::RunContainer {
            target: Target::Node(n.address.clone()),
            name: CONTAINER_NAME.into(),
            image: IMAGE.into(),
            options: RunContainerOptions {
                extra_binds: vec![format!("{}:{}", DATA_DIR, DATA_DIR)],
                ..Default::default()
            },
        });
    }
    steps.push(Commander::WaitReady {
        target: Target::Label("etcd".into()),
        condition: "ready to serve client requests".into(),
        policy: WaitPolicy::default(),
    });

    StepList::new(
        "bootstrap-etcd",
        addrs.iter().map(|n| n.address.clone()).collect(),
        steps,
    )
}

/// Repair a degraded quorum: `replaced` is the control-plane node whose
/// identity changed (needs a fresh peer certificate), `missing` are members
/// that must be (re)started to restore quorum.
pub fn repair(replaced: Option<&Node>, missing: &[&Node]) -> impl Operator {
    let mut missing: Vec<&Node> = missing.to_vec();
    missing.sort_by(|a, b| a.address.cmp(&b.address));

    let mut steps = Vec::new();
    if let Some(n) = replaced {
        steps.push(Commander::IssueCertificate {
            target: Target::Node(n.address.clone()),
            role: CertificateRole::EtcdPeer,
            subject: n.address.clone(),
        });
    }
    for n in &missing {
        steps.push(Commander::RunContainer {
            target: Target::Node(n.address.clone()),
            name: CONTAINER_NAME.into(),
            image: IMAGE.into(),
            options: RunContainerOptions {
                extra_binds: vec![format!("{}:{}", DATA_DIR, DATA_DIR)],
                ..Default::default()
            },
        });
    }

    let mut targets: Vec<String> = missing.iter().map(|n| n.address.clone()).collect();
    if let Some(n) = replaced {
        if !targets.contains(&n.address) {
            targets.push(n.address.clone());
        }
    }

    StepList::new("repair-etcd", targets, steps)
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
            vec!["image-pull", "mkdir", "run-container", "wait-ready"]
        );
    }

    #[test]
    fn repair_issues_certificate_before_restarting_missing_members() {
        let replaced = Node::new("10.0.0.11", true);
        let missing = Node::new("10.0.0.12", true);
        let mut op = repair(Some(&replaced), &[&missing]);
        let cmds = drain(&mut op);
        assert_eq!(
            cmds.iter().map(|c| c.name()).collect::<Vec<_>>(),
            vec!["issue-certificate", "run-container"]
        );
    }

    #[test]
    fn repair_without_replacement_only_restarts_missing() {
        let missing = Node::new("10.0.0.12", true);
        let mut op = repair(None, &[&missing]);
        let cmds = drain(&mut op);
        assert_eq!(
            cmds.iter().map(|c| c.name()).collect::<Vec<_>>(),
            vec!["run-container"]
        );
    }
}
