//! Placement and sizing constraints enforced by the node-set generator.
use crate::error::{ReconcileError, Result};
use serde::{Deserialize, Serialize};

/// Sizing and placement constraints for `Generator`.
///
/// `maximum_workers == 0` means unbounded, not zero (§3, §8 boundary case).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Constraints {
    /// Desired number of control-plane nodes. Must be odd and ≥ 1.
    pub control_plane_count: i32,
    /// Minimum number of healthy workers to maintain.
    pub minimum_workers: i32,
    /// Maximum number of workers to maintain; `0` means unbounded.
    pub maximum_workers: i32,
    /// Maximum number of unreachable nodes tolerated before a reboot
    /// operation is refused.
    pub maximum_unreachable_nodes_for_reboot: i32,
}

impl Constraints {
    /// Validate the invariants documented in `spec.md` §3.
    pub fn validate(&self) -> Result<()> {
        if self.control_plane_count < 1 || self.control_plane_count % 2 == 0 {
            return Err(ReconcileError::Validation(format!(
                "control_plane_count must be odd and >= 1, got {}",
                self.control_plane_count
            )));
        }
        if self.minimum_workers < 0 {
            return Err(ReconcileError::Validation(
                "minimum_workers must be >= 0".into(),
            ));
        }
        if self.maximum_workers != 0 && self.minimum_workers > self.maximum_workers {
            return Err(ReconcileError::Validation(format!(
                "minimum_workers ({}) must be <= maximum_workers ({}) when the latter is non-zero",
                self.minimum_workers, self.maximum_workers
            )));
        }
        Ok(())
    }

    /// Whether `maximum_workers` is set to a real upper bound.
    pub fn bounded_workers(&self) -> bool {
        self.maximum_workers != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Constraints {
        Constraints {
            control_plane_count: 3,
            minimum_workers: 2,
            maximum_workers: 5,
            maximum_unreachable_nodes_for_reboot: 1,
        }
    }

    #[test]
    fn validate_accepts_sane_values() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn validate_rejects_even_control_plane_count() {
        let mut c = base();
        c.control_plane_count = 2;
        assert!(c.validate().is_err());
    }

    #[test]
    fn validate_rejects_min_above_max() {
        let mut c = base();
        c.minimum_workers = 10;
        assert!(c.validate().is_err());
    }

    #[test]
    fn zero_maximum_workers_means_unbounded() {
        let mut c = base();
        c.maximum_workers = 0;
        c.minimum_workers = 1000;
        assert!(c.validate().is_ok());
        assert!(!c.bounded_workers());
    }
}
