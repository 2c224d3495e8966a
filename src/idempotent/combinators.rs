// src/idempotent/combinators.rs

//! Sequential and concurrent composition of actions.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::errors::{ActionError, MultiError};
use crate::idempotent::{perform, Action, Context, Outcome};

/// Run `actions` strictly in order, stopping at the first failure.
///
/// The error is wrapped in [`ActionError::Step`] carrying the zero-based index
/// of the failing action. Later actions are never attempted.
pub async fn multistep<T>(
    ctx: &Context,
    actions: &[Box<dyn Action<Output = T>>],
) -> Result<Vec<Outcome<T>>, ActionError>
where
    T: Send + 'static,
{
    let mut outcomes = Vec::with_capacity(actions.len());

    for (index, action) in actions.iter().enumerate() {
        match perform(ctx, action.as_ref()).await {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => {
                warn!(step = index, action = %action.name(), error = %err, "multistep aborted");
                return Err(ActionError::Step {
                    index,
                    source: Box::new(err),
                });
            }
        }
    }

    Ok(outcomes)
}

/// Run every action concurrently, one Tokio task each, and wait for all.
///
/// A failure never cancels siblings. All failures (including panics) are
/// collected into one [`ActionError::Parallel`]. On success the outcomes are
/// returned in the order of `actions`.
pub async fn parallel<T>(
    ctx: &Context,
    actions: Vec<Box<dyn Action<Output = T>>>,
) -> Result<Vec<Outcome<T>>, ActionError>
where
    T: Send + 'static,
{
    let total = actions.len();
    let (tx, mut rx) = mpsc::channel::<(usize, Result<Outcome<T>, ActionError>)>(total.max(1));

    let mut handles = Vec::with_capacity(total);
    for (index, action) in actions.into_iter().enumerate() {
        let tx = tx.clone();
        let ctx = ctx.clone();
        let handle = tokio::spawn(async move {
            let result = perform(&ctx, action.as_ref()).await;
            // The receiver lives until every sender is dropped.
            let _ = tx.send((index, result)).await;
        });
        handles.push((index, handle));
    }
    drop(tx);

    let mut slots: Vec<Option<Outcome<T>>> = (0..total).map(|_| None).collect();
    let mut failures = Vec::new();

    while let Some((index, result)) = rx.recv().await {
        match result {
            Ok(outcome) => slots[index] = Some(outcome),
            Err(err) => {
                warn!(action = index, error = %err, "parallel action failed");
                failures.push((index, err));
            }
        }
    }

    // A panicked task never reports on the channel.
    for (index, handle) in handles {
        if let Err(join_err) = handle.await {
            warn!(action = index, error = %join_err, "parallel action panicked");
            failures.push((index, ActionError::Panicked(join_err.to_string())));
        }
    }

    if !failures.is_empty() {
        failures.sort_by_key(|(index, _)| *index);
        return Err(ActionError::Parallel(MultiError { total, failures }));
    }

    debug!(total, "all parallel actions finished");
    Ok(slots.into_iter().flatten().collect())
}
