//! C5: constraint-satisfying node set generation from a machine inventory
//! (§4.5), ported from `sabakan`'s `Generator`.
pub mod machine_to_node;
pub mod scoring;
pub mod update_op;

pub use machine_to_node::NodeTemplate;
pub use update_op::UpdateOp;

use crate::{
    cluster::{Cluster, EtcdBackupConfig, Options, RebootConfig},
    constraints::Constraints,
    error::{ReconcileError, Result},
    machine::{Machine, MachineState},
    node::Node,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Default number of seconds a worker waits in `Retiring`/`Retired` before
/// `decrease_worker` removes it.
pub const DEFAULT_WAIT_RETIRING_SECONDS: f64 = 300.0;

/// One worker role's node template plus its placement weight, used to
/// balance new worker placements across roles (§4.5).
#[derive(Clone, Debug)]
pub struct WorkerTemplate {
    /// Role name, matched against `Machine::spec.role`.
    pub role: String,
    /// Relative placement weight; higher draws more new workers.
    pub weight: f64,
    /// Base node template for this role.
    pub template: NodeTemplate,
}

/// Everything the generator needs about the *declared shape* of the
/// cluster, independent of which machines currently fill it: subnets,
/// per-service options, and the control-plane/worker-role templates.
#[derive(Clone, Debug)]
pub struct ClusterTemplate {
    /// Cluster name, carried through unchanged into generated clusters.
    pub name: String,
    /// Service subnet.
    pub service_subnet: ipnetwork::IpNetwork,
    /// Pod subnet.
    pub pod_subnet: ipnetwork::IpNetwork,
    /// Upstream DNS servers.
    pub dns_servers: Vec<String>,
    /// In-cluster DNS service address.
    pub dns_service: String,
    /// Per-service options.
    pub options: Options,
    /// Optional etcd backup configuration.
    pub etcd_backup: Option<EtcdBackupConfig>,
    /// Optional reboot operation configuration.
    pub reboot: Option<RebootConfig>,
    /// Template applied to every control-plane node.
    pub control_plane_template: NodeTemplate,
    /// Templates applied to worker nodes, one per role.
    pub worker_templates: Vec<WorkerTemplate>,
}

/// Generates the next node set from a machine inventory, a cluster
/// template, and sizing constraints (§4.5).
pub struct Generator<'a> {
    template: &'a ClusterTemplate,
    constraints: &'a Constraints,
    timestamp: DateTime<Utc>,
    wait_seconds: f64,

    control_planes: Vec<Node>,
    healthy_cps: i32,

    workers: Vec<Node>,
    healthy_workers: i32,

    machine_map: BTreeMap<String, Machine>,
    workers_by_role: BTreeMap<String, i32>,

    next_unused: Vec<Machine>,
    next_control_planes: Vec<Machine>,
    next_workers: Vec<Machine>,
}

const ROLE_LABEL: &str = "cke.cybozu.com/role";

impl<'a> Generator<'a> {
    /// Build a generator over the current cluster (if any), a declared
    /// template, constraints, and the latest machine inventory snapshot.
    pub fn new(
        current: Option<&Cluster>,
        template: &'a ClusterTemplate,
        constraints: &'a Constraints,
        machines: &[Machine],
        now: DateTime<Utc>,
    ) -> Self {
        let mut machine_map = BTreeMap::new();
        for m in machines {
            if let Some(addr) = m.address() {
                machine_map.insert(addr.to_string(), m.clone());
            }
        }

        let mut control_planes = Vec::new();
        let mut workers = Vec::new();
        let mut healthy_cps = 0;
        let mut healthy_workers = 0;
        let mut workers_by_role = BTreeMap::new();
        let mut declared_addresses = BTreeMap::new();

        if let Some(cluster) = current {
            for n in &cluster.nodes {
                declared_addresses.insert(n.address.clone(), ());
                let machine = machine_map.get(&n.address);
                if n.control_plane {
                    if let Some(m) = machine {
                        if m.status.state == MachineState::Healthy {
                            healthy_cps += 1;
                        }
                    }
                    control_planes.push(n.clone());
                    continue;
                }

                if let Some(m) = machine {
                    if m.status.state == MachineState::Healthy {
                        healthy_workers += 1;
                    }
                }
                workers.push(n.clone());
                let role = n.labels.get(ROLE_LABEL).cloned().unwrap_or_default();
                *workers_by_role.entry(role).or_insert(0) += 1;
            }
        }

        let next_unused = machine_map
            .values()
            .filter(|m| {
                m.address()
                    .map(|a| !declared_addresses.contains_key(a))
                    .unwrap_or(false)
                    && m.status.state == MachineState::Healthy
            })
            .cloned()
            .collect();

        Self {
            template,
            constraints,
            timestamp: now,
            wait_seconds: DEFAULT_WAIT_RETIRING_SECONDS,
            control_planes,
            healthy_cps,
            workers,
            healthy_workers,
            machine_map,
            workers_by_role,
            next_unused,
            next_control_planes: Vec::new(),
            next_workers: Vec::new(),
        }
    }

    /// Override the retiring grace period (default 300s).
    pub fn set_wait_seconds(&mut self, secs: f64) {
        self.wait_seconds = secs;
    }

    fn choose_worker_tmpl(&self) -> &WorkerTemplate {
        let mut best = &self.template.worker_templates[0];
        let mut least = f64::from(*self.workers_by_role.get(&best.role).unwrap_or(&0)) / best.weight;
        for tmpl in &self.template.worker_templates[1..] {
            let w = f64::from(*self.workers_by_role.get(&tmpl.role).unwrap_or(&0)) / tmpl.weight;
            if w < least {
                least = w;
                best = tmpl;
            }
        }
        best
    }

    fn get_worker_tmpl(&self, role: &str) -> &WorkerTemplate {
        if self.template.worker_templates.len() == 1 {
            return &self.template.worker_templates[0];
        }
        self.template
            .worker_templates
            .iter()
            .find(|t| t.role == role)
            .expect("no worker template registered for role")
    }

    fn select_worker_from_unused(&mut self) -> Option<Machine> {
        let tmpl = self.choose_worker_tmpl().clone();
        let pool: Vec<&Machine> = self.next_unused.iter().collect();
        let mut unused = scoring::filter_machines(&pool, &tmpl.role, true);
        if unused.is_empty() {
            return None;
        }

        let counts = self.count_machines_by_rack(false, &tmpl.role);
        scoring::sort_best_first(&mut unused, &counts, self.timestamp);
        let address = unused[0].address()?.to_string();

        let idx = self
            .next_unused
            .iter()
            .position(|m| m.address() == Some(address.as_str()))?;
        let chosen = self.next_unused.remove(idx);
        *self.workers_by_role.entry(tmpl.role.clone()).or_insert(0) += 1;
        Some(chosen)
    }

    fn select_control_plane(&mut self, unused: bool) -> Option<Machine> {
        let source: Vec<Machine> = if unused {
            self.next_unused.clone()
        } else {
            self.next_workers.clone()
        };
        let pool: Vec<&Machine> = source.iter().collect();
        // Control-plane candidates are not role-restricted: any healthy
        // machine is eligible regardless of `spec.role`.
        let mut candidates = scoring::filter_machines(&pool, "", true);
        if candidates.is_empty() {
            return None;
        }

        let counts = self.count_machines_by_rack(true, "");
        scoring::sort_best_first(&mut candidates, &counts, self.timestamp);
        let address = candidates[0].address()?.to_string();

        let target = if unused {
            &mut self.next_unused
        } else {
            &mut self.next_workers
        };
        let idx = target.iter().position(|m| m.address() == Some(address.as_str()))?;
        Some(target.remove(idx))
    }

    fn deselect_control_plane(&mut self) -> Machine {
        let counts = self.count_machines_by_rack(true, "");
        let pool: Vec<&Machine> = self.next_control_planes.iter().collect();
        let mut ordered = pool;
        scoring::sort_worst_first(&mut ordered, &counts, self.timestamp);
        let address = ordered[0].address().unwrap().to_string();
        let idx = self
            .next_control_planes
            .iter()
            .position(|m| m.address() == Some(address.as_str()))
            .unwrap();
        self.next_control_planes.remove(idx)
    }

    fn nodes_to_machines(&self, cp: bool) -> Vec<Machine> {
        let nodes = if cp { &self.control_planes } else { &self.workers };
        nodes
            .iter()
            .filter_map(|n| self.machine_map.get(&n.address).cloned())
            .collect()
    }

    fn count_machines_by_rack(&self, cp: bool, role: &str) -> BTreeMap<i32, i32> {
        let machines = if cp {
            &self.next_control_planes
        } else {
            &self.next_workers
        };
        let mut counts = BTreeMap::new();
        for m in machines {
            if !cp && !role.is_empty() && role != m.spec.role {
                continue;
            }
            *counts.entry(m.spec.rack).or_insert(0) += 1;
        }
        counts
    }

    fn fill(&mut self, op: &mut UpdateOp) -> Result<Cluster> {
        while (self.next_control_planes.len() as i32) < self.constraints.control_plane_count {
            if let Some(m) = self.select_control_plane(true) {
                op.add_control_plane(&m);
                self.next_control_planes.push(m);
                continue;
            }

            if (self.next_workers.len() as i32) > self.constraints.minimum_workers {
                if let Some(m) = self.select_control_plane(false) {
                    op.promote_worker(&m);
                    self.next_control_planes.push(m);
                    continue;
                }
            }
            return Err(ReconcileError::Unavailable);
        }

        while (self.next_workers.len() as i32) < self.constraints.minimum_workers {
            match self.select_worker_from_unused() {
                Some(m) => {
                    op.add_worker(&m);
                    self.next_workers.push(m);
                }
                None => return Err(ReconcileError::Unavailable),
            }
        }

        let mut nodes = Vec::with_capacity(self.next_control_planes.len() + self.next_workers.len());
        for m in &self.next_control_planes {
            if let Some(n) = machine_to_node::machine_to_node(m, &self.template.control_plane_template) {
                nodes.push(n);
            }
        }
        for m in &self.next_workers {
            let tmpl = self.get_worker_tmpl(&m.spec.role).template.clone();
            if let Some(n) = machine_to_node::machine_to_node(m, &tmpl) {
                nodes.push(n);
            }
        }

        Ok(Cluster {
            name: self.template.name.clone(),
            nodes,
            service_subnet: self.template.service_subnet,
            pod_subnet: self.template.pod_subnet,
            dns_servers: self.template.dns_servers.clone(),
            dns_service: self.template.dns_service.clone(),
            options: self.template.options.clone(),
            etcd_backup: self.template.etcd_backup.clone(),
            reboot: self.template.reboot.clone(),
        })
    }

    /// Build a cluster from scratch using only unused healthy machines.
    pub fn generate(&mut self) -> Result<Cluster> {
        let mut op = UpdateOp::new("new");
        op.record("generate new cluster");
        self.fill(&mut op)
    }

    /// Rebuild with the exact same node identities (template change only).
    pub fn regenerate(&mut self) -> Result<Cluster> {
        let mut op = UpdateOp::new("regenerate");

        let mut cps = Vec::new();
        for n in &self.control_planes {
            match self.machine_map.get(&n.address) {
                Some(m) => cps.push(m.clone()),
                None => {
                    return Err(ReconcileError::MissingMachine {
                        address: n.address.clone(),
                    })
                }
            }
        }
        self.next_control_planes = cps;

        let mut workers = Vec::new();
        for n in &self.workers {
            match self.machine_map.get(&n.address) {
                Some(m) => workers.push(m.clone()),
                None => {
                    return Err(ReconcileError::MissingMachine {
                        address: n.address.clone(),
                    })
                }
            }
        }
        self.next_workers = workers;

        op.record("regenerate with new template");
        self.fill(&mut op)
    }

    /// Compute the next incremental step; `None` when no change is needed.
    pub fn update(&mut self) -> Result<Option<Cluster>> {
        if let Some(mut op) = self.remove_non_existent_node()? {
            return self.fill(&mut op).map(Some);
        }
        if let Some(mut op) = self.increase_control_plane() {
            return self.fill(&mut op).map(Some);
        }
        if let Some(mut op) = self.decrease_control_plane() {
            return self.fill(&mut op).map(Some);
        }
        if let Some(mut op) = self.replace_control_plane() {
            return self.fill(&mut op).map(Some);
        }
        if let Some(mut op) = self.increase_worker() {
            return self.fill(&mut op).map(Some);
        }
        if let Some(mut op) = self.decrease_worker() {
            return self.fill(&mut op).map(Some);
        }
        if let Some(mut op) = self.taint_nodes() {
            return self.fill(&mut op).map(Some);
        }
        Ok(None)
    }

    fn remove_non_existent_node(&mut self) -> Result<Option<UpdateOp>> {
        let mut op = UpdateOp::new("remove non-existent node");

        let mut cps = Vec::new();
        for n in &self.control_planes {
            match self.machine_map.get(&n.address) {
                Some(m) => cps.push(m.clone()),
                None => op.record(format!("remove non-existent control plane: {}", n.address)),
            }
        }
        if cps.len() * 2 <= self.control_planes.len() {
            return Err(ReconcileError::TooManyNonExistent);
        }
        self.next_control_planes = cps;

        let mut workers = Vec::new();
        for n in &self.workers {
            match self.machine_map.get(&n.address) {
                Some(m) => workers.push(m.clone()),
                None => op.record(format!("remove non-existent worker: {}", n.address)),
            }
        }
        self.next_workers = workers;

        if op.changes.is_empty() {
            return Ok(None);
        }
        Ok(Some(op))
    }

    fn increase_control_plane(&mut self) -> Option<UpdateOp> {
        if (self.control_planes.len() as i32) >= self.constraints.control_plane_count {
            return None;
        }
        self.next_control_planes = self.nodes_to_machines(true);
        self.next_workers = self.nodes_to_machines(false);
        Some(UpdateOp::new("increase control plane"))
    }

    fn decrease_control_plane(&mut self) -> Option<UpdateOp> {
        if (self.control_planes.len() as i32) <= self.constraints.control_plane_count {
            return None;
        }
        let mut op = UpdateOp::new("decrease control plane");
        self.next_control_planes = self.nodes_to_machines(true);
        self.next_workers = self.nodes_to_machines(false);

        while (self.next_control_planes.len() as i32) != self.constraints.control_plane_count {
            let m = self.deselect_control_plane();
            if self.constraints.maximum_workers == 0
                || (self.next_workers.len() as i32) < self.constraints.maximum_workers
            {
                op.demote_control_plane(&m);
                self.next_workers.push(m);
            } else {
                op.record(format!(
                    "remove excessive control plane: {}",
                    m.address().unwrap_or("?")
                ));
                self.next_unused.push(m);
            }
        }
        Some(op)
    }

    fn replace_control_plane(&mut self) -> Option<UpdateOp> {
        if self.control_planes.len() < 2 {
            return None;
        }

        let mut demote: Option<Machine> = None;
        let mut cps = Vec::with_capacity(self.control_planes.len());
        for n in &self.control_planes {
            let m = self.machine_map.get(&n.address)?;
            if demote.is_some() {
                cps.push(m.clone());
                continue;
            }
            match m.status.state {
                MachineState::Healthy | MachineState::Updating | MachineState::Uninitialized => {
                    cps.push(m.clone());
                }
                _ => demote = Some(m.clone()),
            }
        }

        let demote = demote?;
        let mut op = UpdateOp::new("replace control plane");
        self.next_control_planes = cps;
        self.next_workers = self.nodes_to_machines(false);

        if self.constraints.maximum_workers == 0
            || (self.next_workers.len() as i32) < self.constraints.maximum_workers
        {
            op.demote_control_plane(&demote);
            self.next_workers.push(demote);
            return Some(op);
        }

        match self.select_control_plane(false) {
            None => {
                op.record(format!(
                    "remove bad control plane: {}",
                    demote.address().unwrap_or("?")
                ));
                Some(op)
            }
            Some(promote) => {
                op.promote_worker(&promote);
                if (self.next_workers.len() as i32) < self.constraints.maximum_workers {
                    self.next_workers.push(demote);
                }
                self.next_control_planes.push(promote);
                Some(op)
            }
        }
    }

    fn increase_worker(&mut self) -> Option<UpdateOp> {
        if self.healthy_workers >= self.constraints.minimum_workers {
            return None;
        }
        let mut op = UpdateOp::new("increase worker");
        self.next_control_planes = self.nodes_to_machines(true);
        self.next_workers = self.nodes_to_machines(false);

        for _ in self.healthy_workers..self.constraints.minimum_workers {
            if self.constraints.maximum_workers != 0
                && (self.next_workers.len() as i32) >= self.constraints.maximum_workers
            {
                break;
            }
            match self.select_worker_from_unused() {
                Some(m) => {
                    op.add_worker(&m);
                    self.next_workers.push(m);
                }
                None => break,
            }
        }

        if op.changes.is_empty() {
            None
        } else {
            Some(op)
        }
    }

    fn decrease_worker(&mut self) -> Option<UpdateOp> {
        let mut retiring: Option<Machine> = None;
        let mut workers = Vec::with_capacity(self.workers.len());
        for n in &self.workers {
            let m = self.machine_map.get(&n.address)?;
            if retiring.is_some() {
                workers.push(m.clone());
                continue;
            }
            let is_retiring_state =
                matches!(m.status.state, MachineState::Retiring | MachineState::Retired);
            if !is_retiring_state || m.status.duration < self.wait_seconds {
                workers.push(m.clone());
                continue;
            }
            retiring = Some(m.clone());
        }

        let retiring = retiring?;
        self.next_control_planes = self.nodes_to_machines(true);

        if (workers.len() as i32) >= self.constraints.minimum_workers {
            let mut op = UpdateOp::new("decrease worker");
            op.record(format!(
                "remove retiring worker: {}",
                retiring.address().unwrap_or("?")
            ));
            self.next_workers = workers;
            return Some(op);
        }

        self.next_workers = workers;
        match self.select_worker_from_unused() {
            Some(m) => {
                let mut op = UpdateOp::new("decrease worker");
                op.record(format!(
                    "remove retiring worker: {}",
                    retiring.address().unwrap_or("?")
                ));
                op.add_worker(&m);
                self.next_workers.push(m);
                Some(op)
            }
            None => None,
        }
    }

    fn taint_nodes(&mut self) -> Option<UpdateOp> {
        let mut op = UpdateOp::new("taint nodes");

        let mut cps = Vec::with_capacity(self.control_planes.len());
        for n in &self.control_planes {
            let m = self.machine_map.get(&n.address)?.clone();
            if !machine_to_node::has_valid_taint(n, &m) {
                op.record(format!("change taint of {}", n.address));
            }
            cps.push(m);
        }

        let mut workers = Vec::with_capacity(self.workers.len());
        for n in &self.workers {
            let m = self.machine_map.get(&n.address)?.clone();
            if !machine_to_node::has_valid_taint(n, &m) {
                op.record(format!("change taint of {}", n.address));
            }
            workers.push(m);
        }

        if op.changes.is_empty() {
            return None;
        }

        self.next_control_planes = cps;
        self.next_workers = workers;
        Some(op)
    }
}
