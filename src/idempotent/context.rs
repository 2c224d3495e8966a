// src/idempotent/context.rs

//! Cancellation context passed to [`crate::idempotent::Action::perform`].
//!
//! The combinators never cancel anything themselves; a caller that wants a
//! deadline or Ctrl-C handling creates a context with [`Context::with_cancel`]
//! and fires the [`CancelHandle`]. Actions that run external processes select
//! on [`Context::cancelled`] and stop the process.

use tokio::sync::watch;

#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: Option<watch::Receiver<bool>>,
}

/// Sender half of a cancellable [`Context`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // Receivers may all be gone already; nothing to signal then.
        let _ = self.tx.send(true);
    }
}

impl Context {
    /// A context that is never cancelled.
    pub fn background() -> Self {
        Self { cancel: None }
    }

    pub fn with_cancel() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (Self { cancel: Some(rx) }, CancelHandle { tx })
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once the context is cancelled; pends forever otherwise.
    pub async fn cancelled(&self) {
        let Some(rx) = self.cancel.as_ref() else {
            return std::future::pending().await;
        };

        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Handle dropped without cancelling.
                return std::future::pending().await;
            }
        }
    }
}
