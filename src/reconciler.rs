//! C7: the tick driver — probe → decide → execute → sleep (§5), using the
//! same `rayon::scope`/`par_iter_mut` bounded-concurrency orchestration and
//! signal-driven shutdown shape as a cluster bootstrap loop's main driver.
use crate::{
    commander::{Commander, Target},
    constraints::Constraints,
    infra::{AssetRenderer, Infrastructure, KubernetesClient, RemoteExecutor, Storage, Vault},
    node::Node,
    operator::{self, Operator},
    strategy::{self, DecisionInputs},
};
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, info, warn};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::{
    collections::BTreeMap,
    sync::Arc,
    time::{Duration, Instant},
};

/// Default tick period, matching `spec.md` §6's `CKE_INTERVAL` default.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(10);
/// Default soft deadline for one tick (§5).
pub const DEFAULT_SOFT_DEADLINE: Duration = Duration::from_secs(10 * 60);

/// Drives the single-leader cooperative reconciliation loop.
///
/// Leader election itself is external (§6) — a `Reconciler` assumes it is
/// already the leader for as long as `run` executes and simply stops
/// cleanly when `cancel` fires, tolerating being preempted between any two
/// `Commander`s (§5).
pub struct Reconciler {
    infra: Arc<dyn Infrastructure>,
    storage: Arc<dyn Storage>,
    vault: Arc<dyn Vault>,
    kubernetes: Arc<dyn KubernetesClient>,
    assets: Arc<dyn AssetRenderer>,
    tick_interval: Duration,
    soft_deadline: Duration,
    cancel: Receiver<()>,
    /// Cache of open sessions, keyed by node address. Accessed from
    /// multiple `rayon` worker threads during `execute_phase` (§5's
    /// process-global SSH session map).
    sessions: Mutex<BTreeMap<String, Arc<dyn RemoteExecutor>>>,
}

impl Reconciler {
    /// Build a reconciler over its external collaborators (§6) and a
    /// cancellation channel. Receiving on `cancel`, or the sender being
    /// dropped, stops `run` after the current tick.
    pub fn new(
        infra: Arc<dyn Infrastructure>,
        storage: Arc<dyn Storage>,
        vault: Arc<dyn Vault>,
        kubernetes: Arc<dyn KubernetesClient>,
        assets: Arc<dyn AssetRenderer>,
        cancel: Receiver<()>,
    ) -> Self {
        Self {
            infra,
            storage,
            vault,
            kubernetes,
            assets,
            tick_interval: DEFAULT_TICK_INTERVAL,
            soft_deadline: DEFAULT_SOFT_DEADLINE,
            cancel,
            sessions: Mutex::new(BTreeMap::new()),
        }
    }

    /// Fetch (or open and cache) the session for `addr`.
    fn session(&self, addr: &str) -> Result<Arc<dyn RemoteExecutor>> {
        if let Some(existing) = self.sessions.lock().get(addr) {
            return Ok(Arc::clone(existing));
        }
        let executor: Arc<dyn RemoteExecutor> = Arc::from(self.infra.engine(addr)?);
        self.sessions
            .lock()
            .insert(addr.to_string(), Arc::clone(&executor));
        Ok(executor)
    }

    /// Override the tick period (default 10s, §6's `CKE_INTERVAL`).
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Override the per-tick soft deadline (default 10 minutes, §5).
    pub fn with_soft_deadline(mut self, deadline: Duration) -> Self {
        self.soft_deadline = deadline;
        self
    }

    /// Run ticks until cancelled. Each tick's errors are logged and
    /// swallowed: a failed tick simply leaves state for the next tick to
    /// re-derive, per §5's abandon-and-retry timeout semantics.
    pub fn run(&self) -> Result<()> {
        info!("starting reconciliation loop");
        loop {
            match self.cancel.recv_timeout(self.tick_interval) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    info!("reconciliation loop cancelled");
                    return Ok(());
                }
                Err(RecvTimeoutError::Timeout) => {}
            }

            if let Err(e) = self.tick() {
                warn!("tick failed, will retry next cycle: {:#}", e);
            }
        }
    }

    /// Run exactly one probe → decide → execute cycle.
    pub fn tick(&self) -> Result<()> {
        let started = Instant::now();
        let cluster = self
            .storage
            .get_cluster()
            .context("loading declared cluster")?
            .ok_or_else(|| anyhow!("no cluster declared"))?;
        let _constraints: Constraints = self
            .storage
            .get_constraints()
            .context("loading constraints")?
            .ok_or_else(|| anyhow!("no constraints declared"))?;

        let master = cluster
            .control_plane_nodes()
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("cluster has no control-plane node"))?
            .clone();

        let status = self
            .infra
            .probe(&cluster)
            .context("probing cluster state")?;

        let rendered = self
            .assets
            .render(&cluster)
            .context("rendering service assets")?;
        let resources = self
            .storage
            .get_all_resources()
            .context("loading declared resources")?;

        let inputs = DecisionInputs {
            intended: rendered.intended,
            controller_manager_kubeconfig: rendered.controller_manager_kubeconfig,
            scheduler_kubeconfig: rendered.scheduler_kubeconfig,
            kubelet_assets: rendered.kubelet_assets,
            coredns_manifest: rendered.coredns_manifest,
            resources,
            master: &master,
        };

        let mut ops = strategy::decide_ops(&cluster, &status, &inputs);
        if ops.is_empty() {
            debug!("cluster fully reconciled, nothing to do");
            return Ok(());
        }

        self.execute_phase(&mut ops)?;

        let live_nodes = self
            .kubernetes
            .get_nodes()
            .context("reading live node metadata")?;
        self.reconcile_labels(&cluster, &live_nodes)?;

        if started.elapsed() > self.soft_deadline {
            warn!(
                "tick exceeded soft deadline of {:?} (took {:?})",
                self.soft_deadline,
                started.elapsed()
            );
        }

        Ok(())
    }

    /// Run every operator in one phase concurrently (their `targets()` are
    /// disjoint by construction, §5); within one operator, commands run in
    /// the order the operator emits them.
    fn execute_phase(&self, ops: &mut [Box<dyn Operator>]) -> Result<()> {
        ops.par_iter_mut()
            .try_for_each(|op| self.drain_operator(op.as_mut()))
    }

    fn drain_operator(&self, op: &mut dyn Operator) -> Result<()> {
        debug!("running operator {}", op.name());
        while let Some(command) = op.next_command() {
            debug!("{}", command.describe());
            self.execute_command(&command)
                .with_context(|| format!("executing {}", command.describe()))?;
        }
        Ok(())
    }

    fn execute_command(&self, command: &Commander) -> Result<()> {
        match command {
            Commander::ImagePull { target, image } => {
                self.infra.image_pull(&target_addr(target)?, image)
            }
            Commander::RunContainer {
                target,
                name,
                image,
                options,
            } => self.infra.run_container(
                &target_addr(target)?,
                name,
                image,
                &options.params,
                &options.extra_binds,
                &options.extra_env,
                options.restart,
            ),
            Commander::StopContainer { target, name } => {
                self.infra.stop_container(&target_addr(target)?, name)
            }
            Commander::KillContainer { target, name } => {
                self.infra.kill_container(&target_addr(target)?, name)
            }
            Commander::MkDir { target, path, mode } => {
                let executor = self.session(&target_addr(target)?)?;
                executor.exec(&["mkdir".into(), "-p".into(), path.clone()])?;
                executor.exec(&["chmod".into(), format!("{:o}", mode), path.clone()])?;
                Ok(())
            }
            Commander::MakeFile {
                target,
                path,
                content,
                mode,
            } => {
                let addr = target_addr(target)?;
                self.session(&addr)?.write_file(path, content, *mode)
            }
            Commander::VolumeCreate { target, name } => self
                .session(&target_addr(target)?)?
                .exec(&["volume".into(), "create".into(), name.clone()])
                .map(|_| ()),
            Commander::VolumeRemove { target, name } => self
                .session(&target_addr(target)?)?
                .exec(&["volume".into(), "rm".into(), name.clone()])
                .map(|_| ()),
            Commander::Remove { target, path } => self.session(&target_addr(target)?)?.remove(path),
            Commander::IssueCertificate { role, subject, .. } => {
                let node = Node::new(subject.clone(), false);
                self.vault.issue_for(*role, &node).map(|_| ())
            }
            // Readiness is re-checked by the next tick's probe rather than
            // polled here; a premature return just means one extra tick.
            Commander::WaitReady { .. } => Ok(()),
        }
    }

    fn reconcile_labels(&self, cluster: &crate::cluster::Cluster, live: &[Node]) -> Result<()> {
        let pairs: Vec<(&Node, &Node)> = cluster
            .nodes
            .iter()
            .filter_map(|declared| {
                live.iter()
                    .find(|n| n.address == declared.address)
                    .map(|observed| (declared, observed))
            })
            .collect();

        if pairs.is_empty() {
            return Ok(());
        }

        let master = cluster
            .control_plane_nodes()
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("cluster has no control-plane node"))?;
        let mut op = operator::labels::reconcile(pairs);
        while let Some(command) = op.next_command() {
            if let Commander::MakeFile { content, .. } = &command {
                self.kubernetes.apply(master, content)?;
            }
        }
        Ok(())
    }
}

fn target_addr(target: &Target) -> Result<String> {
    match target {
        Target::Node(addr) => Ok(addr.clone()),
        Target::Label(label) => Err(anyhow!(
            "executor received an unresolved label target: {}",
            label
        )),
    }
}
