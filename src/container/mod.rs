// src/container/mod.rs

//! Desired-state container reconciliation.
//!
//! - [`model`] holds observed containers and desired policies.
//! - [`runtime`] is the capability reconciliation drives.
//! - [`diff`] decides when a container must be recreated.
//! - [`reconcile`] plans and applies the transitions, one idempotent action
//!   per policy.

pub mod diff;
pub mod model;
pub mod reconcile;
pub mod runtime;

pub use diff::needs_recreate;
pub use model::{
    ContainerConfig, ContainerId, ContainerPolicy, ContainerState, DesiredState, Mount, PortBinding,
    PortBindings, RestartPolicy,
};
pub use reconcile::{apply, match_policies, plan, reconcile_all, Observed, PolicyMatch, ReconcileContainer, Step};
pub use runtime::{ContainerRuntime, RuntimeFuture};
