use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use mk::container::{
    ContainerConfig, ContainerId, ContainerPolicy, ContainerRuntime, ContainerState, RuntimeFuture,
};

#[derive(Default)]
struct State {
    containers: BTreeMap<ContainerId, ContainerConfig>,
    images: BTreeMap<String, String>,
    ops: Vec<String>,
    next_id: usize,
}

/// In-memory container runtime recording every mutating call as a string
/// like `"create web"`, `"start c1"`.
#[derive(Clone, Default)]
pub struct FakeRuntime {
    state: Arc<Mutex<State>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `label` resolve to `id`. Unknown labels resolve to `id-<label>`.
    pub fn with_image(self, label: &str, id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .images
            .insert(label.to_string(), id.to_string());
        self
    }

    pub fn insert(&self, container: ContainerConfig) {
        self.state
            .lock()
            .unwrap()
            .containers
            .insert(container.id.clone(), container);
    }

    pub fn ops(&self) -> Vec<String> {
        self.state.lock().unwrap().ops.clone()
    }

    pub fn containers(&self) -> Vec<ContainerConfig> {
        self.state.lock().unwrap().containers.values().cloned().collect()
    }

    pub fn by_name(&self, name: &str) -> Option<ContainerConfig> {
        self.state
            .lock()
            .unwrap()
            .containers
            .values()
            .find(|c| c.name == name)
            .cloned()
    }
}

fn resolve(images: &BTreeMap<String, String>, label: &str) -> String {
    images
        .get(label)
        .cloned()
        .unwrap_or_else(|| format!("id-{label}"))
}

/// A container exactly matching `policy`, as the runtime would create it.
pub fn container_from_policy(
    id: &str,
    policy: &ContainerPolicy,
    image_id: &str,
    state: ContainerState,
) -> ContainerConfig {
    ContainerConfig {
        id: ContainerId::from(id),
        name: policy.name.clone(),
        hostname: policy.hostname.clone().unwrap_or_default(),
        image: image_id.to_string(),
        networks: policy.networks.clone(),
        volumes: policy.volumes.clone(),
        restart_policy: policy.restart_policy.unwrap_or_default(),
        state,
        cmd: policy.cmd.clone().unwrap_or_default(),
        env: policy.env.clone().unwrap_or_default(),
        port_bindings: policy.port_bindings.clone(),
    }
}

impl FakeRuntime {
    fn set_state(&self, op: &str, id: &ContainerId, state: ContainerState) -> anyhow::Result<()> {
        let mut s = self.state.lock().unwrap();
        s.ops.push(format!("{op} {id}"));
        let container = s
            .containers
            .get_mut(id)
            .ok_or_else(|| anyhow!("no such container {id}"))?;
        container.state = state;
        Ok(())
    }
}

impl ContainerRuntime for FakeRuntime {
    fn list(&self) -> RuntimeFuture<'_, BTreeMap<ContainerId, ContainerConfig>> {
        let containers = self.state.lock().unwrap().containers.clone();
        Box::pin(async move { Ok(containers) })
    }

    fn image_id<'a>(&'a self, image: &'a str) -> RuntimeFuture<'a, String> {
        let id = resolve(&self.state.lock().unwrap().images, image);
        Box::pin(async move { Ok(id) })
    }

    fn create<'a>(&'a self, policy: &'a ContainerPolicy) -> RuntimeFuture<'a, ContainerId> {
        let mut s = self.state.lock().unwrap();
        s.next_id += 1;
        let id = format!("c{}", s.next_id);
        let image_id = resolve(&s.images, &policy.image);
        let container = container_from_policy(&id, policy, &image_id, ContainerState::Created);
        s.ops.push(format!("create {}", policy.name));
        s.containers.insert(container.id.clone(), container);
        let id = ContainerId(id);
        Box::pin(async move { Ok(id) })
    }

    fn start<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, ()> {
        let res = self.set_state("start", id, ContainerState::Running);
        Box::pin(async move { res })
    }

    fn stop<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, ()> {
        let res = self.set_state("stop", id, ContainerState::Exited);
        Box::pin(async move { res })
    }

    fn remove<'a>(&'a self, id: &'a ContainerId) -> RuntimeFuture<'a, ()> {
        let mut s = self.state.lock().unwrap();
        s.ops.push(format!("remove {id}"));
        let res = match s.containers.remove(id) {
            Some(_) => Ok(()),
            None => Err(anyhow!("no such container {id}")),
        };
        Box::pin(async move { res })
    }
}
