//! kubelet: runs on every node, control-plane and worker alike (§4.3 #5).
//!
//! Unlike the control-plane services, kubelet needs a per-node certificate
//! issued before its config can be written, and its readiness is only
//! confirmed once the node registers with the API server.
use super::{Operator, StepList};
use crate::{
    commander::{CertificateRole, Commander, RunContainerOptions, Target, WaitPolicy},
    node::Node,
};

const IMAGE: &str = "kubelet";
const CONTAINER_NAME: &str = "kubelet";
const CONFIG_PATH: &str = "/var/lib/kubelet/config.yaml";
const KUBECONFIG_PATH: &str = "/var/lib/kubelet/kubeconfig";

/// One node's rendered kubelet assets, produced by the caller (via
/// `infra.rs`'s encoders) before this operator is built.
pub struct KubeletAssets<'a> {
    /// Node this asset set belongs to.
    pub node: &'a Node,
    /// Rendered `config.yaml` content.
    pub config: Vec<u8>,
    /// Rendered kubeconfig content.
    pub kubeconfig: Vec<u8>,
}

/// Bring up (or restart on config drift) kubelet on every node with
/// `assets` (§4.3 #5): image-pull → issue-certificate → install files →
/// run-container → wait-ready, per node, ascending by address.
pub fn bootstrap(assets: &mut [KubeletAssets<'_>]) -> impl Operator {
    assets.sort_by(|a, b| a.node.address.cmp(&b.node.address));

    let mut steps = Vec::new();
    for a in assets.iter() {
        let addr = a.node.address.clone();
        steps.push(Commander::ImagePull {
            target: Target::Node(addr.clone()),
            image: IMAGE.into(),
        });
        steps.push(Commander::IssueCertificate {
            target: Target::Node(addr.clone()),
            role: CertificateRole::Kubelet,
            subject: addr.clone(),
        });
        steps.push(Commander::MakeFile {
            target: Target::Node(addr.clone()),
            path: CONFIG_PATH.into(),
            content: a.config.clone(),
            mode: 0o644,
        });
        steps.push(Commander::MakeFile {
            target: Target::Node(addr.clone()),
            path: KUBECONFIG_PATH.into(),
            content: a.kubeconfig.clone(),
            mode: 0o600,
        });
        steps.push(Commander::RunContainer {
            target: Target::Node(addr.clone()),
            name: CONTAINER_NAME.into(),
            image: IMAGE.into(),
            options: RunContainerOptions {
                extra_binds: vec![
                    format!("{}:{}", CONFIG_PATH, CONFIG_PATH),
                    format!("{}:{}", KUBECONFIG_PATH, KUBECONFIG_PATH),
                ],
                restart: true,
                ..Default::default()
            },
        });
        steps.push(Commander::WaitReady {
            target: Target::Node(addr.clone()),
            condition: "node registered".into(),
            policy: WaitPolicy::default(),
        });
    }

    StepList::new(
        "bootstrap-kubelet",
        assets.iter().map(|a| a.node.address.clone()).collect(),
        steps,
    )
}

/// Stop kubelet on nodes where it should not run. No file removal: a
/// decommissioned node is expected to be reimaged, not patched clean.
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
        "stop-kubelet",
        addrs.iter().map(|n| n.address.clone()).collect(),
        steps,
    )
}
