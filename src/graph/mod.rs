// src/graph/mod.rs

//! Resource/task graph engine.
//!
//! - [`key`] defines structural [`ResourceKey`]s.
//! - [`resource`] defines the closed [`Resource`] payload type.
//! - [`task`] defines [`Task`] and its action signature.
//! - [`system`] holds the [`System`] store/registry and the [`Fetch`]
//!   capability tasks use to pull their dependencies.

pub mod key;
pub mod resource;
pub mod system;
pub mod task;

pub use key::{KeyPart, ResourceKey};
pub use resource::{Package, Resource, ResourceKind};
pub use system::{Fetch, System};
pub use task::{Task, TaskAction};
