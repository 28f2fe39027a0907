//! The error taxonomy consumed by callers of the decision engine and generator.
use thiserror::Error;

/// Domain error kinds surfaced by the reconciliation core.
///
/// Individual `Commander`s and the executor that drives them report through
/// `anyhow::Result` (see `infra.rs`); this type exists for the handful of
/// call sites — `Generator::{Update,Regenerate}`, `Cluster::validate` — whose
/// callers need to branch on *which* domain condition occurred rather than
/// just log and retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// No healthy `Machine` is available to satisfy a placement constraint.
    /// Non-fatal: the next generation cycle retries.
    #[error("no healthy machine is available")]
    Unavailable,

    /// A node in the cluster has no backing `Machine` during `Regenerate`.
    #[error("failed to apply new template due to missing machine for {address}")]
    MissingMachine {
        /// Address of the node with no backing machine.
        address: String,
    },

    /// Removing non-existent control-plane nodes would destroy etcd quorum.
    #[error("too many non-existent control plane nodes")]
    TooManyNonExistent,

    /// Transient I/O failure against a node, exhausted local retries.
    #[error("node {address} is unreachable: {reason}")]
    Unreachable {
        /// Address of the unreachable node.
        address: String,
        /// Underlying reason, as reported by the transport.
        reason: String,
    },

    /// A `Cluster` or `Constraints` value failed validation.
    #[error("validation failed: {0}")]
    Validation(String),
}

/// Convenient alias for results returned by the typed error boundary.
pub type Result<T> = std::result::Result<T, ReconcileError>;
