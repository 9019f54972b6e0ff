//! Pipeline behaviors - cross-cutting interceptors around request handlers.
//!
//! A [`PipelineBehavior`] receives the request together with [`Next`], the rest
//! of the chain. It may:
//!
//! - run code before and after calling `next` (logging, timing),
//! - skip `next` entirely to short-circuit the chain (validation failure),
//! - transform the result or error coming back from `next` (transactions).
//!
//! `Next` is consumed when run, so a behavior can invoke the remainder of the
//! chain at most once.
//!
//! # Ordering
//!
//! Behaviors run in registration order on the way in and in reverse order on
//! the way out, exactly like nested function calls:
//!
//! ```text
//! B1 before → B2 before → handler → B2 after → B1 after
//! ```
//!
//! # Example
//!
//! ```
//! use composable_mediator_core::behavior::{Next, PipelineBehavior};
//! use composable_mediator_core::context::Context;
//! use composable_mediator_core::handler::HandlerResult;
//! use composable_mediator_core::request::Request;
//! use futures::future::BoxFuture;
//!
//! struct Audit;
//!
//! impl PipelineBehavior for Audit {
//!     fn handle(&self, ctx: Context, request: Request, next: Next) -> BoxFuture<'_, HandlerResult> {
//!         Box::pin(async move {
//!             println!("-> {}", request.name());
//!             let result = next.run(ctx).await;
//!             println!("<- {} ok={}", request.name(), result.is_ok());
//!             result
//!         })
//!     }
//! }
//! ```

use crate::context::Context;
use crate::handler::HandlerResult;
use crate::request::Request;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;

/// A one-shot continuation invoking the remainder of the pipeline.
pub struct Next {
    continuation: Box<dyn FnOnce(Context) -> BoxFuture<'static, HandlerResult> + Send>,
}

impl Next {
    /// Wrap a continuation.
    ///
    /// Used by the pipeline composer; behaviors only ever receive and run `Next`.
    pub fn new<F>(continuation: F) -> Self
    where
        F: FnOnce(Context) -> BoxFuture<'static, HandlerResult> + Send + 'static,
    {
        Self {
            continuation: Box::new(continuation),
        }
    }

    /// Invoke the rest of the chain (eventually the terminal handler).
    pub fn run(self, ctx: Context) -> BoxFuture<'static, HandlerResult> {
        (self.continuation)(ctx)
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Next(<continuation>)")
    }
}

/// Interceptor wrapped around every dispatched request.
pub trait PipelineBehavior: Send + Sync {
    /// Handle the request, usually by calling `next.run(ctx)`.
    ///
    /// # Errors
    ///
    /// Errors from `next` should propagate unchanged unless the behavior exists
    /// to convert them. Behaviors may also fail on their own (validation,
    /// unit of work).
    fn handle(&self, ctx: Context, request: Request, next: Next) -> BoxFuture<'_, HandlerResult>;

    /// Name used in logs and metrics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Behavior backed by a closure. Created by [`behavior_fn`].
pub struct BehaviorFn<F> {
    name: &'static str,
    f: F,
}

/// Adapt `Fn(Context, Request, Next) -> Future<Output = HandlerResult>` into a
/// [`PipelineBehavior`].
///
/// # Example
///
/// ```
/// use composable_mediator_core::behavior::behavior_fn;
///
/// let passthrough = behavior_fn("passthrough", |ctx, _request, next| next.run(ctx));
/// ```
pub const fn behavior_fn<F, Fut>(name: &'static str, f: F) -> BehaviorFn<F>
where
    F: Fn(Context, Request, Next) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    BehaviorFn { name, f }
}

impl<F, Fut> PipelineBehavior for BehaviorFn<F>
where
    F: Fn(Context, Request, Next) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn handle(&self, ctx: Context, request: Request, next: Next) -> BoxFuture<'_, HandlerResult> {
        Box::pin((self.f)(ctx, request, next))
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use crate::error::MediatorError;
    use crate::request::{Response, downcast_response};

    fn terminal(value: u32) -> Next {
        Next::new(move |_ctx| Box::pin(async move { Ok(Box::new(value) as Response) }))
    }

    #[tokio::test]
    async fn next_runs_the_continuation() {
        let response = terminal(7).run(Context::background()).await.unwrap();
        assert_eq!(downcast_response::<u32>("T", response).unwrap(), 7);
    }

    #[tokio::test]
    async fn closure_behavior_can_short_circuit() {
        let reject = behavior_fn("reject", |_ctx, _request, _next| async {
            Err(MediatorError::handler("rejected"))
        });

        let error = reject
            .handle(Context::background(), Request::new("T", ()), terminal(1))
            .await
            .unwrap_err();

        assert_eq!(error.to_string(), "rejected");
        assert_eq!(reject.name(), "reject");
    }

    #[tokio::test]
    async fn closure_behavior_can_rewrite_result() {
        let double = behavior_fn("double", |ctx, _request, next: Next| async move {
            let value = downcast_response::<u32>("T", next.run(ctx).await?)?;
            Ok::<_, MediatorError>(Box::new(value * 2) as Response)
        });

        let response = double
            .handle(Context::background(), Request::new("T", ()), terminal(21))
            .await
            .unwrap();

        assert_eq!(downcast_response::<u32>("T", response).unwrap(), 42);
    }

    struct Named;

    impl PipelineBehavior for Named {
        fn handle(
            &self,
            ctx: Context,
            _request: Request,
            next: Next,
        ) -> BoxFuture<'_, HandlerResult> {
            next.run(ctx)
        }
    }

    #[test]
    fn default_name_is_type_name() {
        assert!(Named.name().ends_with("Named"));
    }
}
