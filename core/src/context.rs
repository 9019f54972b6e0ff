//! Request context threaded through every handler and behavior.
//!
//! A [`Context`] carries three things across the dispatch chain:
//!
//! - a cancellation signal that handlers blocking on slow work should observe,
//! - an optional deadline (the dispatcher never enforces it; a timeout behavior does),
//! - an optional correlation id that is copied onto published notifications.
//!
//! Contexts are cheap to clone; every clone observes the same cancellation signal.
//!
//! # Example
//!
//! ```
//! use composable_mediator_core::context::Context;
//!
//! let (ctx, cancel) = Context::cancellable();
//! let ctx = ctx.with_correlation_id("req-42");
//!
//! assert!(!ctx.is_cancelled());
//! cancel.cancel();
//! assert!(ctx.is_cancelled());
//! assert_eq!(ctx.correlation_id(), Some("req-42"));
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Context for a single dispatch.
#[derive(Clone, Debug)]
pub struct Context {
    cancellation: watch::Receiver<bool>,
    deadline: Option<Instant>,
    correlation_id: Option<Arc<str>>,
}

/// Cancels every [`Context`] created from the same [`Context::cancellable`] call.
#[derive(Clone, Debug)]
pub struct CancellationHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancellationHandle {
    /// Signal cancellation. Calling it more than once has no further effect.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Whether [`cancel`](Self::cancel) has been called
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        let (_sender, receiver) = watch::channel(false);
        Self {
            cancellation: receiver,
            deadline: None,
            correlation_id: None,
        }
    }

    /// A fresh context together with the handle that cancels it.
    #[must_use]
    pub fn cancellable() -> (Self, CancellationHandle) {
        let (sender, receiver) = watch::channel(false);
        let ctx = Self {
            cancellation: receiver,
            deadline: None,
            correlation_id: None,
        };
        (
            ctx,
            CancellationHandle {
                sender: Arc::new(sender),
            },
        )
    }

    /// Set an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline relative to now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Attach a correlation id (e.g. the inbound HTTP request id).
    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<Arc<str>>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// The deadline, if any
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline, saturating at zero.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// The correlation id, if any
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Shared correlation id, for copying into notifications without reallocating.
    #[must_use]
    pub fn correlation_id_arc(&self) -> Option<Arc<str>> {
        self.correlation_id.clone()
    }

    /// Whether cancellation has been signalled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.cancellation.borrow()
    }

    /// Completes once cancellation is signalled.
    ///
    /// For a [`Context::background`] context this never completes.
    pub async fn cancelled(&self) {
        let mut receiver = self.cancellation.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                // Sender dropped without cancelling: cancellation can no longer happen.
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_is_never_cancelled() {
        let ctx = Context::background();
        assert!(!ctx.is_cancelled());
        assert!(ctx.deadline().is_none());
        assert!(ctx.correlation_id().is_none());
    }

    #[test]
    fn cancellation_reaches_every_clone() {
        let (ctx, handle) = Context::cancellable();
        let clone = ctx.clone();

        handle.cancel();
        handle.cancel();

        assert!(ctx.is_cancelled());
        assert!(clone.is_cancelled());
        assert!(handle.is_cancelled());
    }

    #[test]
    fn remaining_saturates_at_zero() {
        let ctx = Context::background().with_deadline(Instant::now());
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[tokio::test]
    async fn cancelled_future_completes_after_cancel() {
        let (ctx, handle) = Context::cancellable();

        let waiter = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.cancelled().await }
        });

        handle.cancel();

        let joined = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(matches!(joined, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn background_cancelled_future_stays_pending() {
        let ctx = Context::background();
        let waited = tokio::time::timeout(Duration::from_millis(20), ctx.cancelled()).await;
        assert!(waited.is_err());
    }
}
