//! Physical machine inventory consumed (read-only) by the node-set generator.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a physical machine, driven externally by the
/// inventory system. The generator only ever reads this.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    /// Freshly registered, never brought up.
    Uninitialized,
    /// Passing health checks.
    Healthy,
    /// Failing health checks but reachable.
    Unhealthy,
    /// Not reachable at all.
    Unreachable,
    /// Undergoing a firmware/OS update.
    Updating,
    /// Marked for removal, draining.
    Retiring,
    /// Fully removed from service.
    Retired,
}

/// A single free-form `{name, value}` inventory label, as distinct from the
/// Kubernetes labels attached to a `Node`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineLabel {
    /// Label name.
    pub name: String,
    /// Label value.
    pub value: String,
}

/// Static inventory facts about a machine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MachineSpec {
    /// Vendor serial number, used as a tie-break key when scoring.
    pub serial: String,
    /// IPv4 addresses; the first is the machine's identity.
    pub ipv4: Vec<String>,
    /// Physical rack identifier, used for placement diversity.
    pub rack: i32,
    /// Position within the rack.
    pub index_in_rack: i32,
    /// Role name, matched against worker node templates
    /// (`cke.cybozu.com/role`).
    pub role: String,
    /// Free-form inventory labels.
    #[serde(default)]
    pub labels: Vec<MachineLabel>,
    /// When the machine was registered into inventory.
    pub register_date: DateTime<Utc>,
    /// When the machine is scheduled to retire.
    pub retire_date: DateTime<Utc>,
}

impl MachineSpec {
    /// The machine's identity address, i.e. the first IPv4 entry.
    pub fn address(&self) -> Option<&str> {
        self.ipv4.first().map(String::as_str)
    }
}

/// Dynamic health facts about a machine.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MachineStatus {
    /// Current lifecycle state.
    pub state: MachineState,
    /// Seconds spent in the current state.
    pub duration: f64,
}

/// A physical machine in the fleet inventory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    /// Static inventory facts.
    pub spec: MachineSpec,
    /// Dynamic health facts.
    pub status: MachineStatus,
}

impl Machine {
    /// The machine's identity address, i.e. the first IPv4 entry.
    pub fn address(&self) -> Option<&str> {
        self.spec.address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    pub fn test_machine(serial: &str, addr: &str, rack: i32, state: MachineState) -> Machine {
        Machine {
            spec: MachineSpec {
                serial: serial.into(),
                ipv4: vec![addr.into()],
                rack,
                index_in_rack: 0,
                role: "worker".into(),
                labels: vec![],
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
    fn address_is_first_ipv4() {
        let m = test_machine("1234", "10.0.0.20", 1, MachineState::Healthy);
        assert_eq!(m.address(), Some("10.0.0.20"));
    }

    #[test]
    fn address_is_none_without_ipv4() {
        let mut m = test_machine("1234", "10.0.0.20", 1, MachineState::Healthy);
        m.spec.ipv4.clear();
        assert_eq!(m.address(), None);
    }
}
