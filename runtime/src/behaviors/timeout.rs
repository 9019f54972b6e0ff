//! Time budgets and cancellation.
//!
//! The dispatcher imposes no timeout of its own. [`TimeoutBehavior`] races the
//! rest of the chain against three things and fails with the first to fire:
//!
//! - its own fixed timeout, if configured ([`MediatorError::Timeout`]),
//! - the context deadline ([`MediatorError::Timeout`]),
//! - context cancellation ([`MediatorError::Cancelled`]).
//!
//! When it fires, the inner future is dropped at its next await point.

use crate::config::MediatorConfig;
use composable_mediator_core::behavior::{Next, PipelineBehavior};
use composable_mediator_core::context::Context;
use composable_mediator_core::error::MediatorError;
use composable_mediator_core::handler::HandlerResult;
use composable_mediator_core::request::Request;
use futures::future::BoxFuture;
use std::time::Duration;

/// Enforces a time budget and context cancellation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutBehavior {
    timeout: Option<Duration>,
}

impl TimeoutBehavior {
    /// Fail requests that take longer than `timeout`.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    /// Only honor the context's deadline and cancellation.
    #[must_use]
    pub const fn context_only() -> Self {
        Self { timeout: None }
    }

    /// Use the config's default timeout.
    #[must_use]
    pub const fn from_config(config: &MediatorConfig) -> Self {
        Self {
            timeout: config.default_timeout,
        }
    }

    /// Effective budget: the tighter of the fixed timeout and the deadline.
    fn budget(&self, ctx: &Context) -> Option<Duration> {
        match (self.timeout, ctx.remaining()) {
            (Some(fixed), Some(remaining)) => Some(fixed.min(remaining)),
            (fixed, remaining) => fixed.or(remaining),
        }
    }
}

impl PipelineBehavior for TimeoutBehavior {
    fn handle(&self, ctx: Context, request: Request, next: Next) -> BoxFuture<'_, HandlerResult> {
        let budget = self.budget(&ctx);

        Box::pin(async move {
            let watcher = ctx.clone();
            let work = next.run(ctx);

            let bounded = async {
                match budget {
                    Some(budget) => tokio::time::timeout(budget, work)
                        .await
                        .unwrap_or(Err(MediatorError::Timeout(budget))),
                    None => work.await,
                }
            };

            let result = tokio::select! {
                biased;
                () = watcher.cancelled() => Err(MediatorError::Cancelled),
                result = bounded => result,
            };

            match &result {
                Err(MediatorError::Timeout(budget)) => {
                    metrics::counter!(
                        "mediator.requests.timed_out",
                        "request" => request.name().to_string()
                    )
                    .increment(1);
                    tracing::warn!(
                        request = %request.name(),
                        budget_ms = budget.as_millis(),
                        "Request timed out"
                    );
                }
                Err(MediatorError::Cancelled) => {
                    tracing::debug!(request = %request.name(), "Request cancelled");
                }
                _ => {}
            }

            result
        })
    }

    fn name(&self) -> &'static str {
        "timeout"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use composable_mediator_core::request::{Response, downcast_response};

    fn sleeping(duration: Duration) -> Next {
        Next::new(move |_ctx| {
            Box::pin(async move {
                tokio::time::sleep(duration).await;
                Ok(Box::new("slept") as Response)
            })
        })
    }

    #[tokio::test]
    async fn fast_requests_pass() {
        let response = TimeoutBehavior::new(Duration::from_secs(5))
            .handle(Context::background(), Request::new("Quick", ()), sleeping(Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(downcast_response::<&str>("Quick", response).unwrap(), "slept");
    }

    #[tokio::test]
    async fn overrun_becomes_timeout() {
        let error = TimeoutBehavior::new(Duration::from_millis(50))
            .handle(
                Context::background(),
                Request::new("Slow", ()),
                sleeping(Duration::from_secs(10)),
            )
            .await
            .unwrap_err();
        assert!(matches!(error, MediatorError::Timeout(d) if d == Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn context_deadline_is_honored() {
        let ctx = Context::background().with_timeout(Duration::from_millis(20));
        let error = TimeoutBehavior::context_only()
            .handle(ctx, Request::new("Slow", ()), sleeping(Duration::from_secs(10)))
            .await
            .unwrap_err();
        assert!(matches!(error, MediatorError::Timeout(_)));
    }

    #[tokio::test]
    async fn cancellation_wins() {
        let (ctx, cancel) = Context::cancellable();
        cancel.cancel();
        let error = TimeoutBehavior::context_only()
            .handle(ctx, Request::new("Slow", ()), sleeping(Duration::from_secs(10)))
            .await
            .unwrap_err();
        assert!(matches!(error, MediatorError::Cancelled));
    }

    #[test]
    fn budget_takes_the_tighter_limit() {
        let behavior = TimeoutBehavior::new(Duration::from_secs(1));
        assert_eq!(behavior.budget(&Context::background()), Some(Duration::from_secs(1)));
        assert_eq!(TimeoutBehavior::context_only().budget(&Context::background()), None);

        let tight = Context::background().with_timeout(Duration::from_millis(10));
        assert!(behavior.budget(&tight).unwrap() <= Duration::from_millis(10));
    }
}
