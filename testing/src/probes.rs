//! Observation helpers for handlers and behaviors.

use composable_mediator_core::behavior::{Next, PipelineBehavior};
use composable_mediator_core::context::Context;
use composable_mediator_core::handler::HandlerResult;
use composable_mediator_core::request::Request;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Shared invocation counter. Clones count into the same total.
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    /// Counter starting at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    /// Calls recorded so far
    #[must_use]
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Shared, ordered log of labels. Clones append to the same log.
#[derive(Debug, Clone, Default)]
pub struct Trace(Arc<Mutex<Vec<String>>>);

impl Trace {
    /// Empty trace
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn push(&self, entry: impl Into<String>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.into());
    }

    /// Entries in the order they were pushed
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// Behavior that writes `{label}-Before` and `{label}-After` to a [`Trace`]
/// around the rest of the chain.
///
/// # Example
///
/// ```
/// use composable_mediator_testing::{Trace, TracingBehavior};
///
/// let trace = Trace::new();
/// let b1 = TracingBehavior::new("B1", trace.clone());
/// let b2 = TracingBehavior::new("B2", trace.clone());
/// ```
#[derive(Debug, Clone)]
pub struct TracingBehavior {
    label: String,
    trace: Trace,
}

impl TracingBehavior {
    /// Behavior writing under `label` into `trace`
    #[must_use]
    pub fn new(label: impl Into<String>, trace: Trace) -> Self {
        Self {
            label: label.into(),
            trace,
        }
    }
}

impl PipelineBehavior for TracingBehavior {
    fn handle(&self, ctx: Context, _request: Request, next: Next) -> BoxFuture<'_, HandlerResult> {
        Box::pin(async move {
            self.trace.push(format!("{}-Before", self.label));
            let result = next.run(ctx).await;
            self.trace.push(format!("{}-After", self.label));
            result
        })
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}
