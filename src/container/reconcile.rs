// src/container/reconcile.rs

//! Driving containers towards their policies.
//!
//! Reconciliation is split into a pure planning step ([`plan`]), which turns
//! a policy and the observed container into a list of [`Step`]s, and
//! [`apply`], which executes them against a [`ContainerRuntime`]. An empty
//! plan means the container already matches its policy, which is what
//! [`ReconcileContainer::is_completed`](crate::idempotent::Action::is_completed)
//! checks.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use tracing::info;

use crate::container::{
    needs_recreate, ContainerConfig, ContainerId, ContainerPolicy, ContainerRuntime, ContainerState,
    DesiredState,
};
use crate::errors::{ActionError, ContainerError};
use crate::idempotent::{parallel, Action, ActionFuture, Context, Outcome};

/// One runtime operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Start(ContainerId),
    Stop(ContainerId),
    Remove(ContainerId),
    /// Create a container from the policy, starting it if `start` is set.
    Create { start: bool },
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Start(id) => write!(f, "start {id}"),
            Step::Stop(id) => write!(f, "stop {id}"),
            Step::Remove(id) => write!(f, "remove {id}"),
            Step::Create { start: true } => f.write_str("create and start"),
            Step::Create { start: false } => f.write_str("create"),
        }
    }
}

/// A container found on the host together with the id its policy's image
/// resolves to.
#[derive(Debug, Clone, Copy)]
pub struct Observed<'a> {
    pub container: &'a ContainerConfig,
    pub image_id: &'a str,
}

/// Steps needed to bring `observed` (or its absence) to `policy`.
pub fn plan(policy: &ContainerPolicy, observed: Option<Observed<'_>>) -> Result<Vec<Step>, ContainerError> {
    use ContainerState as S;
    use DesiredState as D;

    let Some(Observed { container, image_id }) = observed else {
        return Ok(match policy.state {
            D::Absent => Vec::new(),
            D::Started => vec![Step::Create { start: true }],
            D::Present | D::Stopped => vec![Step::Create { start: false }],
        });
    };

    let id = container.id.clone();
    let unsupported = || ContainerError::UnsupportedTransition {
        container: policy.name.clone(),
        desired: policy.state,
        state: container.state,
    };

    if container.state == S::Dead {
        return Err(unsupported());
    }

    if policy.state != D::Absent {
        let diff = needs_recreate(container, policy, image_id);
        if !diff.is_empty() {
            info!(container = %policy.name, diff = ?diff, "container needs to be recreated");
            let mut steps = Vec::new();
            if is_running(container.state) {
                steps.push(Step::Stop(id.clone()));
            }
            if container.state != S::Removing {
                steps.push(Step::Remove(id));
            }
            steps.push(Step::Create {
                start: policy.state == D::Started,
            });
            return Ok(steps);
        }
    }

    let steps = match (policy.state, container.state) {
        (_, S::Dead) => return Err(unsupported()),

        (D::Started, S::Running | S::Restarting) => Vec::new(),
        (D::Started, S::Created | S::Paused | S::Exited) => vec![Step::Start(id)],
        (D::Started, S::Removing) => vec![Step::Create { start: true }],

        (D::Absent, S::Removing) => Vec::new(),
        (D::Absent, S::Created | S::Paused | S::Exited) => vec![Step::Remove(id)],
        (D::Absent, S::Running | S::Restarting) => vec![Step::Stop(id.clone()), Step::Remove(id)],

        (D::Present, S::Removing) => vec![Step::Create { start: false }],
        (D::Present, _) => Vec::new(),

        (D::Stopped, S::Running | S::Restarting) => vec![Step::Stop(id)],
        (D::Stopped, S::Created | S::Paused | S::Removing | S::Exited) => Vec::new(),
    };
    Ok(steps)
}

fn is_running(state: ContainerState) -> bool {
    matches!(state, ContainerState::Running | ContainerState::Restarting)
}

/// Execute `steps` in order against `runtime`.
pub async fn apply(runtime: &dyn ContainerRuntime, policy: &ContainerPolicy, steps: &[Step]) -> Result<()> {
    for step in steps {
        info!(container = %policy.name, step = %step, "reconciling");
        match step {
            Step::Start(id) => runtime
                .start(id)
                .await
                .with_context(|| format!("start container {id}"))?,
            Step::Stop(id) => runtime
                .stop(id)
                .await
                .with_context(|| format!("stop container {id}"))?,
            Step::Remove(id) => runtime
                .remove(id)
                .await
                .with_context(|| format!("remove container {id}"))?,
            Step::Create { start } => {
                let id = runtime
                    .create(policy)
                    .await
                    .with_context(|| format!("create container {:?}", policy.name))?;
                if *start {
                    runtime
                        .start(&id)
                        .await
                        .with_context(|| format!("start container {id}"))?;
                }
            }
        }
    }
    Ok(())
}

/// A policy paired with the container of the same name, if any.
#[derive(Debug, Clone)]
pub struct PolicyMatch {
    pub policy: ContainerPolicy,
    pub container: Option<ContainerConfig>,
}

/// Pair each policy with the observed container carrying its name.
pub fn match_policies(
    containers: &BTreeMap<ContainerId, ContainerConfig>,
    policies: &[ContainerPolicy],
) -> Vec<PolicyMatch> {
    let by_name: BTreeMap<&str, &ContainerConfig> =
        containers.values().map(|c| (c.name.as_str(), c)).collect();

    policies
        .iter()
        .map(|policy| PolicyMatch {
            policy: policy.clone(),
            container: by_name.get(policy.name.as_str()).map(|c| (*c).clone()),
        })
        .collect()
}

/// Idempotent action reconciling one container with its policy.
///
/// Completed iff [`plan`] returns no steps for the container currently on
/// the host.
pub struct ReconcileContainer {
    runtime: Arc<dyn ContainerRuntime>,
    policy: ContainerPolicy,
}

impl ReconcileContainer {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, policy: ContainerPolicy) -> Self {
        Self { runtime, policy }
    }

    async fn current_plan(&self) -> Result<Vec<Step>> {
        let containers = self.runtime.list().await.context("list containers")?;
        let found = containers.values().find(|c| c.name == self.policy.name);

        let steps = match found {
            None => plan(&self.policy, None)?,
            Some(container) => {
                let image_id = self
                    .runtime
                    .image_id(&self.policy.image)
                    .await
                    .with_context(|| format!("resolve image {:?}", self.policy.image))?;
                plan(
                    &self.policy,
                    Some(Observed {
                        container,
                        image_id: &image_id,
                    }),
                )?
            }
        };
        Ok(steps)
    }
}

impl Action for ReconcileContainer {
    type Output = Vec<Step>;

    fn name(&self) -> String {
        format!("reconcile container {}", self.policy.name)
    }

    fn is_completed(&self) -> ActionFuture<'_, bool> {
        Box::pin(async move { Ok(self.current_plan().await?.is_empty()) })
    }

    fn perform<'a>(&'a self, _ctx: &'a Context) -> ActionFuture<'a, Vec<Step>> {
        Box::pin(async move {
            let steps = self.current_plan().await?;
            apply(self.runtime.as_ref(), &self.policy, &steps).await?;
            Ok(steps)
        })
    }
}

/// Reconcile every policy concurrently. One failing container doesn't stop
/// the others; all failures are reported together.
pub async fn reconcile_all(
    ctx: &Context,
    runtime: Arc<dyn ContainerRuntime>,
    policies: &[ContainerPolicy],
) -> Result<Vec<Outcome<Vec<Step>>>, ActionError> {
    let actions: Vec<Box<dyn Action<Output = Vec<Step>>>> = policies
        .iter()
        .map(|policy| {
            Box::new(ReconcileContainer::new(runtime.clone(), policy.clone()))
                as Box<dyn Action<Output = Vec<Step>>>
        })
        .collect();
    parallel(ctx, actions).await
}
