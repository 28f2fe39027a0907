//! External collaborators the reconciliation core consumes but never
//! implements (§6): remote execution, persisted state, certificate
//! issuance, and the Kubernetes API. Each is a `Send + Sync` trait so a
//! `Reconciler` can hold them behind an `Arc` across a `rayon` scope.
use crate::{
    cluster::{Cluster, ClusterStatus},
    commander::CertificateRole,
    constraints::Constraints,
    node::Node,
    node_filter::IntendedConfigs,
};
use anyhow::Result;
use std::collections::BTreeMap;

/// A single remote execution session against one node, analogous to the
/// teacher's `Process`/SSH-session abstraction but generalized to any
/// transport the infrastructure layer chooses.
pub trait RemoteExecutor: Send + Sync {
    /// Run a command on the remote side, returning captured stdout.
    fn exec(&self, command: &[String]) -> Result<Vec<u8>>;
    /// Write `content` to `path` atomically.
    fn write_file(&self, path: &str, content: &[u8], mode: u32) -> Result<()>;
    /// Remove `path`; absence is success.
    fn remove(&self, path: &str) -> Result<()>;
}

/// Session factory and node-state probe consumed by the executor and the
/// reconciliation tick respectively (§6's `Infrastructure.probe() →
/// ClusterStatus` data flow).
pub trait Infrastructure: Send + Sync {
    /// Open (or reuse) a session to `addr`.
    fn engine(&self, addr: &str) -> Result<Box<dyn RemoteExecutor>>;
    /// Pull `image` on `addr`.
    fn image_pull(&self, addr: &str, image: &str) -> Result<()>;
    /// Create or recreate a container on `addr`.
    fn run_container(
        &self,
        addr: &str,
        name: &str,
        image: &str,
        params: &[String],
        extra_binds: &[String],
        extra_env: &BTreeMap<String, String>,
        restart: bool,
    ) -> Result<()>;
    /// Stop a container; absence is success.
    fn stop_container(&self, addr: &str, name: &str) -> Result<()>;
    /// Forcibly kill a container that ignored `stop_container`.
    fn kill_container(&self, addr: &str, name: &str) -> Result<()>;
    /// Probe every declared node in `cluster`, with bounded concurrency,
    /// and return the observed live state.
    fn probe(&self, cluster: &Cluster) -> Result<ClusterStatus>;
}

/// Persisted cluster state, keyed the way `spec.md` §6 lays out the `cke/`
/// namespace.
pub trait Storage: Send + Sync {
    /// Fetch the declared cluster, if one has been set.
    fn get_cluster(&self) -> Result<Option<Cluster>>;
    /// Persist the declared cluster.
    fn put_cluster(&self, cluster: &Cluster) -> Result<()>;
    /// Fetch the declared sizing constraints, if set.
    fn get_constraints(&self) -> Result<Option<Constraints>>;
    /// Persist sizing constraints.
    fn put_constraints(&self, constraints: &Constraints) -> Result<()>;
    /// Fetch every declared resource manifest, keyed `<kind>/<namespace>/<name>`.
    fn get_all_resources(&self) -> Result<BTreeMap<String, Vec<u8>>>;
    /// Fetch a CA certificate previously issued for `role`.
    fn get_ca(&self, role: &str) -> Result<Option<Vec<u8>>>;
    /// Persist a CA certificate for `role`.
    fn put_ca(&self, role: &str, cert: &[u8]) -> Result<()>;
}

/// Certificate signer, one method per `CertificateRole` variant (§6).
pub trait Vault: Send + Sync {
    /// Issue a certificate/key pair for `role`, identifying `node` as the
    /// subject.
    fn issue_for(&self, role: CertificateRole, node: &Node) -> Result<(Vec<u8>, Vec<u8>)>;
}

/// Thin wrapper around the Kubernetes API, scoped to what the core needs:
/// applying rendered manifests and reading back live node metadata to
/// detect label/taint/annotation drift (§4.3's `labels` operator, §6).
pub trait KubernetesClient: Send + Sync {
    /// Apply a rendered manifest against `master`.
    fn apply(&self, master: &Node, manifest: &[u8]) -> Result<()>;
    /// Fetch every node's live labels/annotations/taints, keyed by address.
    fn get_nodes(&self) -> Result<Vec<Node>>;
}

/// Rendered per-cycle assets the decision engine needs but does not
/// produce itself — kubeconfigs, kubelet config, the CoreDNS manifest, and
/// digests of what each service's config is intended to be (§4.1's drift
/// detection). Kept separate from `Storage`/`Vault` because rendering
/// composes data from both (and the cluster's own template) rather than
/// fetching a single stored value.
#[derive(Clone, Debug, Default)]
pub struct RenderedAssets {
    /// Digests of the intended per-service configuration, used to detect
    /// drift (§4.1).
    pub intended: IntendedConfigs,
    /// Rendered controller-manager kubeconfig.
    pub controller_manager_kubeconfig: Vec<u8>,
    /// Rendered scheduler kubeconfig.
    pub scheduler_kubeconfig: Vec<u8>,
    /// Rendered kubelet config + kubeconfig, keyed by node address.
    pub kubelet_assets: BTreeMap<String, (Vec<u8>, Vec<u8>)>,
    /// Rendered CoreDNS manifest.
    pub coredns_manifest: Vec<u8>,
}

/// Turns a declared `Cluster` into the rendered bytes `decide_ops` needs.
/// The concrete Kubernetes object encoder (kubeconfig generation, kubelet
/// config templating, CoreDNS manifest rendering) lives outside this
/// crate (§1's encoder Non-goal) — this trait is the seam it plugs into.
pub trait AssetRenderer: Send + Sync {
    /// Render every asset `decide_ops` may need for this cluster.
    fn render(&self, cluster: &Cluster) -> Result<RenderedAssets>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullKubernetesClient;

    impl KubernetesClient for NullKubernetesClient {
        fn apply(&self, _master: &Node, _manifest: &[u8]) -> Result<()> {
            Ok(())
        }

        fn get_nodes(&self) -> Result<Vec<Node>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn trait_object_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Box<dyn KubernetesClient>>();
        let client: Box<dyn KubernetesClient> = Box::new(NullKubernetesClient);
        assert!(client.get_nodes().unwrap().is_empty());
    }
}
