//! # cke-core
//!
//! Cluster reconciliation core for a Kubernetes bootstrap/lifecycle tool:
//! a pure decision engine (C1/C4) that turns a declared `Cluster` and
//! observed `ClusterStatus` into an ordered list of `Operator`s, a
//! constraint-satisfying node-set `Generator` (C5) driven by a machine
//! inventory, and a `Reconciler` (C7) that ties both to external
//! collaborators — remote execution, persisted state, certificate
//! issuance, and the Kubernetes API — through the traits in `infra`.
//!
//! This crate is a library. CLI parsing, YAML envelope loading, the
//! secret backend, SSH/container execution, Kubernetes object encoders,
//! and operator persistence are external collaborators reached only
//! through `infra`'s traits.
#![deny(missing_docs)]

pub mod cluster;
pub mod commander;
pub mod constraints;
pub mod error;
pub mod generator;
pub mod infra;
pub mod machine;
pub mod node;
pub mod node_filter;
pub mod operator;
pub mod reconciler;
pub mod strategy;

pub use cluster::{Cluster, ClusterStatus};
pub use commander::Commander;
pub use constraints::Constraints;
pub use error::{ReconcileError, Result};
pub use generator::Generator;
pub use machine::Machine;
pub use node::Node;
pub use operator::Operator;
pub use reconciler::Reconciler;
pub use strategy::decide_ops;
