//! Machine scoring and role filtering for candidate selection (§4.5).
//!
//! The upstream `scoreMachine`/`filterMachines` bodies were not present in
//! the retrieved source (only their call sites were); this implements the
//! prose description directly: penalize racks already heavily represented,
//! reward machines further from retirement and more recently registered,
//! prefer healthier states, and break ties by serial then address.
use crate::machine::{Machine, MachineState};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Weight applied per existing machine already placed in a candidate's
/// rack. Large enough that one additional same-rack placement outweighs
/// any plausible age/state delta.
const RACK_WEIGHT: f64 = 10.0;

fn state_score(state: MachineState) -> f64 {
    match state {
        MachineState::Healthy => 300.0,
        MachineState::Updating => 200.0,
        MachineState::Uninitialized => 100.0,
        _ => 0.0,
    }
}

fn age_score(machine: &Machine, now: DateTime<Utc>) -> f64 {
    let until_retire = (machine.spec.retire_date - now).num_days().max(0) as f64;
    let since_register = (now - machine.spec.register_date).num_days().max(0) as f64;
    until_retire + since_register
}

/// Score a candidate machine: higher is more desirable. `count_in_rack` is
/// the number of machines already placed (in the set being filled) in each
/// rack.
pub fn score_machine(
    machine: &Machine,
    count_in_rack: &BTreeMap<i32, i32>,
    now: DateTime<Utc>,
) -> f64 {
    let rack_penalty = RACK_WEIGHT * f64::from(*count_in_rack.get(&machine.spec.rack).unwrap_or(&0));
    -rack_penalty + age_score(machine, now) + state_score(machine.status.state)
}

/// Order candidates best-first: highest score first, ties broken by
/// ascending serial then ascending address (§4.5).
pub fn sort_best_first(
    candidates: &mut [&Machine],
    count_in_rack: &BTreeMap<i32, i32>,
    now: DateTime<Utc>,
) {
    candidates.sort_by(|a, b| {
        let sa = score_machine(a, count_in_rack, now);
        let sb = score_machine(b, count_in_rack, now);
        sb.partial_cmp(&sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.spec.serial.cmp(&b.spec.serial))
            .then_with(|| a.address().cmp(&b.address()))
    });
}

/// Order candidates worst-first: lowest score first, same tie-break.
pub fn sort_worst_first(
    candidates: &mut [&Machine],
    count_in_rack: &BTreeMap<i32, i32>,
    now: DateTime<Utc>,
) {
    candidates.sort_by(|a, b| {
        let sa = score_machine(a, count_in_rack, now);
        let sb = score_machine(b, count_in_rack, now);
        sa.partial_cmp(&sb)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.spec.serial.cmp(&b.spec.serial))
            .then_with(|| a.address().cmp(&b.address()))
    });
}

/// Keep machines matching `role` (when `role` is non-empty) and, if
/// `healthy_only`, in the `Healthy` state.
pub fn filter_machines<'a>(
    pool: &[&'a Machine],
    role: &str,
    healthy_only: bool,
) -> Vec<&'a Machine> {
    pool.iter()
        .copied()
        .filter(|m| role.is_empty() || m.spec.role == role)
        .filter(|m| !healthy_only || m.status.state == MachineState::Healthy)
        .collect()
}
