// src/container/diff.rs

//! Deciding whether an existing container has to be recreated.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use crate::container::{ContainerConfig, ContainerPolicy};

/// Fields of `container` that differ from `policy`, with a short
/// `expected=.. actual=..` description each. Empty means the container can
/// be kept.
///
/// `image_id` is the id the policy's image label currently resolves to.
/// Networks and volumes are compared as sets. Hostname, restart policy, cmd
/// and env are only compared when the policy sets them.
pub fn needs_recreate(
    container: &ContainerConfig,
    policy: &ContainerPolicy,
    image_id: &str,
) -> BTreeMap<&'static str, String> {
    let mut diff = BTreeMap::new();

    if container.name != policy.name {
        diff.insert("name", describe(&policy.name, &container.name));
    }
    if let Some(hostname) = &policy.hostname {
        if *hostname != container.hostname {
            diff.insert("hostname", describe(hostname, &container.hostname));
        }
    }
    if container.image != image_id {
        diff.insert("image", describe(&image_id, &container.image));
    }
    if !same_elements(&container.networks, &policy.networks) {
        diff.insert("networks", describe(&policy.networks, &container.networks));
    }
    if !same_elements(&container.volumes, &policy.volumes) {
        diff.insert("volumes", describe(&policy.volumes, &container.volumes));
    }
    if let Some(restart) = policy.restart_policy {
        if restart != container.restart_policy {
            diff.insert("restart policy", describe(&restart, &container.restart_policy));
        }
    }
    if let Some(cmd) = &policy.cmd {
        if *cmd != container.cmd {
            diff.insert("cmd", describe(cmd, &container.cmd));
        }
    }
    if let Some(env) = &policy.env {
        if *env != container.env {
            diff.insert("env", describe(env, &container.env));
        }
    }
    if container.port_bindings != policy.port_bindings {
        diff.insert(
            "port bindings",
            describe(&policy.port_bindings, &container.port_bindings),
        );
    }

    diff
}

fn same_elements<T: Ord>(xs: &[T], ys: &[T]) -> bool {
    xs.iter().collect::<BTreeSet<_>>() == ys.iter().collect::<BTreeSet<_>>()
}

fn describe<E: Debug + ?Sized, A: Debug + ?Sized>(expected: &E, actual: &A) -> String {
    format!("expected={:?} actual={:?}", expected, actual)
}
