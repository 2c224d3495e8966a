// src/container/runtime.rs

//! Container runtime capability.
//!
//! Reconciliation only needs these six operations; an implementation can
//! wrap a local daemon, an agent on a remote host, or an in-memory fake.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use anyhow::Result;

use crate::container::{ContainerConfig, ContainerId, ContainerPolicy};

pub type RuntimeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

pub trait ContainerRuntime: Send + Sync {
    /// All containers on the host, including stopped ones.
    fn list(&self) -> RuntimeFuture<'_, BTreeMap<ContainerId, ContainerConfig>>;

    /// Resolve an image label to its id, pulling the image if needed.
    fn image_id<'a>(&'a self, image: &'a str) -> RuntimeFuture<'a, String>;

    /// Create (but don't start) a container from `policy`.
    fn create<'a>(&'a self, policy: &'a ContainerPolicy) -> RuntimeFuture<'a, ContainerId>;

    fn start<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, ()>;

    fn stop<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, ()>;

    fn remove<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, ()>;
}
