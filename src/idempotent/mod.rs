// src/idempotent/mod.rs

//! Idempotent actions.
//!
//! An [`Action`] splits an effect into "is this already true?"
//! ([`Action::is_completed`]) and "make it true" ([`Action::perform`]).
//! [`perform`] always asks first, so actions are safe to invoke
//! unconditionally.
//!
//! - [`combinators`] composes actions sequentially ([`multistep`]) or
//!   concurrently ([`parallel`]).
//! - [`context`] carries cancellation into long-running effects.
//! - [`mkdir`] is a local-filesystem action.

pub mod combinators;
pub mod context;
pub mod mkdir;

use std::future::Future;
use std::pin::Pin;

use tracing::debug;

use crate::errors::ActionError;

pub use combinators::{multistep, parallel};
pub use context::{CancelHandle, Context};
pub use mkdir::{Mkdir, MkdirOptions};

/// Boxed future returned by [`Action`] methods.
pub type ActionFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// An effect that may already be satisfied.
///
/// Contract: after `perform` succeeds, `is_completed` must return `true`.
/// The framework never re-checks this. The framework keeps no state of its
/// own; `is_completed` is queried fresh on every [`perform`] call.
pub trait Action: Send + Sync {
    type Output: Send + 'static;

    /// Short human-readable label used in logs.
    fn name(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }

    fn is_completed(&self) -> ActionFuture<'_, bool>;

    fn perform<'a>(&'a self, ctx: &'a Context) -> ActionFuture<'a, Self::Output>;
}

/// Result of running an action through [`perform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// `is_completed` reported true; `perform` was not called.
    AlreadyDone,
    Performed(T),
}

impl<T> Outcome<T> {
    pub fn was_performed(&self) -> bool {
        matches!(self, Outcome::Performed(_))
    }

    pub fn into_performed(self) -> Option<T> {
        match self {
            Outcome::Performed(value) => Some(value),
            Outcome::AlreadyDone => None,
        }
    }
}

/// Run `action` unless it is already completed.
///
/// A failing completion check is wrapped in [`ActionError::CheckFailed`]; a
/// failing `perform` is returned as [`ActionError::PerformFailed`] with the
/// original error untouched.
pub async fn perform<A>(ctx: &Context, action: &A) -> Result<Outcome<A::Output>, ActionError>
where
    A: Action + ?Sized,
{
    let name = action.name();

    let completed = action
        .is_completed()
        .await
        .map_err(ActionError::CheckFailed)?;

    if completed {
        debug!(action = %name, "already completed; skipping");
        return Ok(Outcome::AlreadyDone);
    }

    debug!(action = %name, "performing");
    let value = action
        .perform(ctx)
        .await
        .map_err(ActionError::PerformFailed)?;

    Ok(Outcome::Performed(value))
}
