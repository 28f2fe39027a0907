//! Change log accumulated by one `Generate`/`Regenerate`/`Update` call,
//! ported from the upstream `updateOp` — used only for logging, never
//! consulted by `fill`'s control flow.
use crate::machine::Machine;

/// Record of what one generator invocation changed, for logging.
#[derive(Clone, Debug, Default)]
pub struct UpdateOp {
    /// Human-readable name of the sub-goal that produced this change set.
    pub name: &'static str,
    /// One line per change, in the order recorded.
    pub changes: Vec<String>,
}

impl UpdateOp {
    /// Start a new, empty change log under `name`.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            changes: Vec::new(),
        }
    }

    /// Append a free-form change line.
    pub fn record(&mut self, line: impl Into<String>) {
        self.changes.push(line.into());
    }

    /// Record that `machine` was added as a control plane.
    pub fn add_control_plane(&mut self, machine: &Machine) {
        self.record(format!(
            "add control plane: {}",
            machine.address().unwrap_or("?")
        ));
    }

    /// Record that a worker was promoted to control plane.
    pub fn promote_worker(&mut self, machine: &Machine) {
        self.record(format!(
            "promote worker: {}",
            machine.address().unwrap_or("?")
        ));
    }

    /// Record that a control plane was demoted to worker.
    pub fn demote_control_plane(&mut self, machine: &Machine) {
        self.record(format!(
            "demote control plane: {}",
            machine.address().unwrap_or("?")
        ));
    }

    /// Record that `machine` was added as a worker.
    pub fn add_worker(&mut self, machine: &Machine) {
        self.record(format!("add worker: {}", machine.address().unwrap_or("?")));
    }
}
