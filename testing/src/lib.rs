//! # Composable Mediator Testing
//!
//! Testing utilities and doubles for the Composable Mediator.
//!
//! This crate provides:
//! - Mock implementations of collaborator traits (clock, repository, unit of work)
//! - Probes for observing handler and behavior execution
//! - Async polling and tracing helpers
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```
//! use composable_mediator_testing::{CallCounter, Trace, TracingBehavior};
//! use composable_mediator_runtime::Mediator;
//! use composable_mediator_core::context::Context;
//! use composable_mediator_core::request::Request;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let trace = Trace::new();
//! let calls = CallCounter::new();
//! let mediator = Mediator::new();
//! mediator
//!     .add_pipeline_behavior(TracingBehavior::new("B1", trace.clone()))
//!     .add_pipeline_behavior(TracingBehavior::new("B2", trace.clone()));
//!
//! let (handler_trace, handler_calls) = (trace.clone(), calls.clone());
//! mediator
//!     .register_command("Test", move |_ctx, _cmd: Arc<()>| {
//!         handler_trace.push("Handler");
//!         handler_calls.increment();
//!         async { Ok(()) }
//!     })
//!     .unwrap();
//!
//! mediator.send(Context::background(), Request::new("Test", ())).await.unwrap();
//! assert_eq!(trace.entries(), ["B1-Before", "B2-Before", "Handler", "B2-After", "B1-After"]);
//! assert_eq!(calls.count(), 1);
//! # });
//! ```

use chrono::{DateTime, Utc};
use composable_mediator_core::environment::Clock;

mod probes;
mod repository_mocks;

/// Mock implementations of collaborator traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    pub use crate::repository_mocks::{InMemoryRepository, RecordingUnitOfWork, UowStep};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use composable_mediator_testing::mocks::FixedClock;
    /// use composable_mediator_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Test helpers and utilities
pub mod helpers {
    use std::time::{Duration, Instant};

    pub use crate::probes::{CallCounter, Trace, TracingBehavior};

    /// Poll `condition` until it holds or `timeout` elapses.
    ///
    /// Returns whether the condition was observed. Used to wait for
    /// fire-and-forget work such as async notification handlers.
    pub async fn eventually<F>(timeout: Duration, condition: F) -> bool
    where
        F: Fn() -> bool,
    {
        let start = Instant::now();
        loop {
            if condition() {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Install a `tracing` subscriber writing to the test harness.
    ///
    /// Filtered by `RUST_LOG`; safe to call from every test.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// Non-empty request or notification names, `PascalCase`
    pub fn handler_names() -> impl Strategy<Value = String> {
        "[A-Z][A-Za-z]{0,15}"
    }

    /// Outcome pattern for a list of subscribers: `true` means the subscriber fails
    pub fn subscriber_outcomes(max: usize) -> impl Strategy<Value = Vec<bool>> {
        proptest::collection::vec(any::<bool>(), 0..=max)
    }
}

// Re-export commonly used items
pub use helpers::{CallCounter, Trace, TracingBehavior, eventually, init_test_tracing};
pub use mocks::{FixedClock, InMemoryRepository, RecordingUnitOfWork, UowStep, test_clock};
