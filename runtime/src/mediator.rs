//! The mediator: request dispatch and notification fan-out.
//!
//! # Lifecycle
//!
//! 1. Construct one [`Mediator`] at start-up and share it as `Arc<Mediator>`.
//! 2. Register handlers, subscribers and pipeline behaviors.
//! 3. Dispatch with [`Mediator::send`], [`Mediator::publish`] and
//!    [`Mediator::publish_async`].
//! 4. On shutdown call [`Mediator::drain`] so async subscribers can finish.
//!
//! Registration stays possible after dispatch has started; the registry is
//! read-mostly and no lock is held while handlers run.
//!
//! # Example
//!
//! ```
//! use composable_mediator_runtime::mediator::Mediator;
//! use composable_mediator_runtime::behaviors::LoggingBehavior;
//! use composable_mediator_core::context::Context;
//! use composable_mediator_core::error::MediatorError;
//! use std::sync::Arc;
//!
//! struct CreateOrder { name: String, count: u32 }
//!
//! # tokio_test::block_on(async {
//! let mediator = Mediator::new();
//! mediator.add_pipeline_behavior(LoggingBehavior);
//! mediator
//!     .register_command("CreateOrder", |_ctx, cmd: Arc<CreateOrder>| async move {
//!         if cmd.count == 0 {
//!             return Err(MediatorError::handler("count must be positive"));
//!         }
//!         Ok(123_i64)
//!     })
//!     .unwrap();
//!
//! let id: i64 = mediator
//!     .send_typed(Context::background(), "CreateOrder", CreateOrder { name: "widget".into(), count: 2 })
//!     .await
//!     .unwrap();
//! assert_eq!(id, 123);
//! # });
//! ```

use crate::behaviors::recovery::panic_message;
use crate::config::{MediatorConfig, PublishStrategy};
use crate::pipeline;
use crate::registry::HandlerRegistry;
use composable_mediator_core::behavior::PipelineBehavior;
use composable_mediator_core::context::Context;
use composable_mediator_core::error::MediatorError;
use composable_mediator_core::event::DomainEvent;
use composable_mediator_core::handler::{
    HandlerResult, NotificationHandler, RequestHandler, typed_handler, typed_notification,
};
use composable_mediator_core::notification::Notification;
use composable_mediator_core::request::{Request, downcast_response};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Decrements the in-flight counter when an async subscriber task ends,
/// including when it panics.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-process dispatcher for commands, queries and notifications.
pub struct Mediator {
    config: MediatorConfig,
    registry: HandlerRegistry,
    behaviors: RwLock<Vec<Arc<dyn PipelineBehavior>>>,
    in_flight: Arc<AtomicUsize>,
}

impl Mediator {
    /// Create a mediator with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MediatorConfig::default())
    }

    /// Create a mediator with custom configuration.
    #[must_use]
    pub fn with_config(config: MediatorConfig) -> Self {
        Self {
            registry: HandlerRegistry::new(config.duplicate_policy),
            config,
            behaviors: RwLock::new(Vec::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &MediatorConfig {
        &self.config
    }

    /// The underlying handler registry
    #[must_use]
    pub const fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    // ----- registration ----------------------------------------------------

    /// Append a pipeline behavior.
    ///
    /// Behaviors wrap every subsequent `send` in registration order: the first
    /// behavior added is the outermost.
    pub fn add_pipeline_behavior<B>(&self, behavior: B) -> &Self
    where
        B: PipelineBehavior + 'static,
    {
        let behavior: Arc<dyn PipelineBehavior> = Arc::new(behavior);
        tracing::debug!(behavior = behavior.name(), "Added pipeline behavior");
        self.behaviors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(behavior);
        self
    }

    /// Names of the registered behaviors, outermost first
    #[must_use]
    pub fn behavior_names(&self) -> Vec<&'static str> {
        self.behaviors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|behavior| behavior.name())
            .collect()
    }

    /// Bind a command handler to `name`.
    ///
    /// # Errors
    ///
    /// [`MediatorError::InvalidName`] for an empty name, or
    /// [`MediatorError::DuplicateHandler`] under the reject policy.
    pub fn register_command_handler<H>(&self, name: &str, handler: H) -> Result<(), MediatorError>
    where
        H: RequestHandler + 'static,
    {
        self.registry.register_command_handler(name, Arc::new(handler))
    }

    /// Bind a query handler to `name`. Queries share the command namespace.
    ///
    /// # Errors
    ///
    /// Same as [`register_command_handler`](Self::register_command_handler).
    pub fn register_query_handler<H>(&self, name: &str, handler: H) -> Result<(), MediatorError>
    where
        H: RequestHandler + 'static,
    {
        self.registry.register_query_handler(name, Arc::new(handler))
    }

    /// Append a notification subscriber for `name`.
    ///
    /// # Errors
    ///
    /// [`MediatorError::InvalidName`] for an empty name.
    pub fn register_notification_handler<H>(
        &self,
        name: &str,
        handler: H,
    ) -> Result<(), MediatorError>
    where
        H: NotificationHandler + 'static,
    {
        self.registry
            .register_notification_handler(name, Arc::new(handler))
    }

    /// Bind a typed command handler.
    ///
    /// The payload is downcast to `C` once, before the closure runs; the
    /// closure's value becomes the response.
    ///
    /// # Errors
    ///
    /// Same as [`register_command_handler`](Self::register_command_handler).
    pub fn register_command<C, R, F, Fut>(&self, name: &str, f: F) -> Result<(), MediatorError>
    where
        C: Any + Send + Sync,
        R: Any + Send,
        F: Fn(Context, Arc<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, MediatorError>> + Send + 'static,
    {
        self.register_command_handler(name, typed_handler(f))
    }

    /// Bind a typed query handler.
    ///
    /// # Errors
    ///
    /// Same as [`register_command_handler`](Self::register_command_handler).
    pub fn register_query<Q, R, F, Fut>(&self, name: &str, f: F) -> Result<(), MediatorError>
    where
        Q: Any + Send + Sync,
        R: Any + Send,
        F: Fn(Context, Arc<Q>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, MediatorError>> + Send + 'static,
    {
        self.register_query_handler(name, typed_handler(f))
    }

    /// Append a typed notification subscriber.
    ///
    /// Notifications under `name` whose payload is not a `T` are skipped by this
    /// subscriber.
    ///
    /// # Errors
    ///
    /// [`MediatorError::InvalidName`] for an empty name.
    pub fn register_notification<T, F, Fut>(&self, name: &str, f: F) -> Result<(), MediatorError>
    where
        T: Any + Send + Sync,
        F: Fn(Context, Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), MediatorError>> + Send + 'static,
    {
        self.register_notification_handler(name, typed_notification(f))
    }

    // ----- dispatch --------------------------------------------------------

    fn behaviors_snapshot(&self) -> Vec<Arc<dyn PipelineBehavior>> {
        self.behaviors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Dispatch a request to the single handler bound to its name.
    ///
    /// The handler runs inside every registered pipeline behavior. Its result,
    /// success or error, is returned unchanged unless a behavior converts it.
    ///
    /// # Errors
    ///
    /// - [`MediatorError::HandlerNotFound`] when no handler is bound. No
    ///   behavior runs in that case.
    /// - Any error returned by a behavior or the handler.
    #[tracing::instrument(
        skip(self, ctx, request),
        fields(request = %request.name()),
        name = "mediator_send"
    )]
    pub async fn send(&self, ctx: Context, request: Request) -> HandlerResult {
        let name = request.name().to_string();

        let Some(handler) = self.registry.request_handler(&name) else {
            tracing::warn!("No handler registered for request");
            metrics::counter!("mediator.handler_not_found", "request" => name.clone()).increment(1);
            metrics::counter!(
                "mediator.requests.total",
                "request" => name.clone(),
                "outcome" => "not_found"
            )
            .increment(1);
            return Err(MediatorError::HandlerNotFound(name));
        };

        let behaviors = self.behaviors_snapshot();
        tracing::debug!(behaviors = behaviors.len(), "Dispatching request");

        let start = Instant::now();
        let result = pipeline::compose(&behaviors, handler, request).run(ctx).await;

        metrics::histogram!("mediator.request.duration_seconds", "request" => name.clone())
            .record(start.elapsed().as_secs_f64());
        let outcome = if result.is_ok() { "success" } else { "error" };
        metrics::counter!("mediator.requests.total", "request" => name, "outcome" => outcome)
            .increment(1);

        result
    }

    /// Wrap `request` under `name`, dispatch it and downcast the response to `R`.
    ///
    /// # Errors
    ///
    /// Everything [`send`](Self::send) returns, plus
    /// [`MediatorError::UnexpectedResponse`] when the handler answered with
    /// something other than an `R`.
    pub async fn send_typed<T, R>(
        &self,
        ctx: Context,
        name: &str,
        request: T,
    ) -> Result<R, MediatorError>
    where
        T: Any + Send + Sync,
        R: Any,
    {
        let response = self.send(ctx, Request::new(name, request)).await?;
        downcast_response::<R>(name, response)
    }

    /// Deliver a notification to every subscriber, one after another.
    ///
    /// Subscribers run in registration order. A name without subscribers is
    /// not an error. The context's correlation id is attached to the
    /// notification unless it already carries one.
    ///
    /// # Errors
    ///
    /// - Under [`PublishStrategy::FailFast`] the first subscriber error is
    ///   returned and later subscribers do not run.
    /// - Under [`PublishStrategy::RunAll`] every subscriber runs and all errors
    ///   are returned together as [`MediatorError::Aggregate`].
    #[tracing::instrument(
        skip(self, ctx, notification),
        fields(notification = %notification.name()),
        name = "mediator_publish"
    )]
    pub async fn publish(
        &self,
        ctx: Context,
        notification: Notification,
    ) -> Result<(), MediatorError> {
        let notification = notification.or_correlation_id(ctx.correlation_id_arc());
        let name = notification.name().to_string();
        let handlers = self.registry.notification_handlers(&name);

        metrics::counter!("mediator.notifications.published", "notification" => name.clone())
            .increment(1);

        if handlers.is_empty() {
            tracing::debug!("No subscribers for notification");
            return Ok(());
        }

        tracing::debug!(subscribers = handlers.len(), "Publishing notification");

        let mut failures = Vec::new();
        for (index, handler) in handlers.iter().enumerate() {
            let Err(error) = handler.handle(ctx.clone(), notification.clone()).await else {
                continue;
            };

            metrics::counter!("mediator.notifications.failed", "notification" => name.clone())
                .increment(1);
            tracing::warn!(subscriber = index, error = %error, "Notification handler failed");

            match self.config.publish_strategy {
                PublishStrategy::FailFast => return Err(error),
                PublishStrategy::RunAll => failures.push(error),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(MediatorError::Aggregate(failures))
        }
    }

    /// Publish a domain event under its own name.
    ///
    /// # Errors
    ///
    /// Same as [`publish`](Self::publish).
    pub async fn publish_event<E>(&self, ctx: Context, event: &E) -> Result<(), MediatorError>
    where
        E: DomainEvent + Clone,
    {
        self.publish(ctx, Notification::from_event(event.clone())).await
    }

    /// Fire-and-forget publish: every subscriber runs in its own Tokio task.
    ///
    /// Returns immediately with the number of tasks spawned. The caller never
    /// observes subscriber results; failures and panics are logged and counted
    /// under `mediator.notifications.async_failed`. Use
    /// [`in_flight`](Self::in_flight) or [`drain`](Self::drain) to wait for the
    /// spawned tasks.
    ///
    /// Called outside a Tokio runtime, nothing is spawned and the notification
    /// is dropped with an error log.
    pub fn publish_async(&self, ctx: Context, notification: Notification) -> usize {
        let notification = notification.or_correlation_id(ctx.correlation_id_arc());
        let name = notification.name().to_string();
        let handlers = self.registry.notification_handlers(&name);

        if handlers.is_empty() {
            tracing::debug!(notification = %name, "No subscribers for async notification");
            return 0;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!(
                notification = %name,
                subscribers = handlers.len(),
                "publish_async called outside a Tokio runtime, notification dropped"
            );
            metrics::counter!("mediator.notifications.async_failed", "notification" => name)
                .increment(handlers.len() as u64);
            return 0;
        };

        metrics::counter!("mediator.notifications.published", "notification" => name.clone())
            .increment(1);

        let spawned = handlers.len();
        for (index, handler) in handlers.into_iter().enumerate() {
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            let guard = InFlightGuard(Arc::clone(&self.in_flight));
            let ctx = ctx.clone();
            let notification = notification.clone();
            let name = name.clone();

            runtime.spawn(async move {
                let _guard = guard;
                let outcome = AssertUnwindSafe(handler.handle(ctx, notification))
                    .catch_unwind()
                    .await;

                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(error)) => {
                        metrics::counter!(
                            "mediator.notifications.async_failed",
                            "notification" => name.clone()
                        )
                        .increment(1);
                        tracing::warn!(
                            notification = %name,
                            subscriber = index,
                            error = %error,
                            "Async notification handler failed"
                        );
                    }
                    Err(panic) => {
                        metrics::counter!(
                            "mediator.notifications.async_failed",
                            "notification" => name.clone()
                        )
                        .increment(1);
                        tracing::error!(
                            notification = %name,
                            subscriber = index,
                            panic = %panic_message(panic.as_ref()),
                            "Async notification handler panicked"
                        );
                    }
                }
            });
        }

        tracing::debug!(
            notification = %name,
            subscribers = spawned,
            "Spawned async notification handlers"
        );
        spawned
    }

    /// Number of async subscriber tasks still running
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Wait for async subscriber tasks to finish.
    ///
    /// Registration and dispatch stay available while draining; tasks spawned
    /// during the wait are waited for too.
    ///
    /// # Errors
    ///
    /// Returns [`MediatorError::Timeout`] if tasks are still running when
    /// `timeout` expires.
    pub async fn drain(&self, timeout: Duration) -> Result<(), MediatorError> {
        tracing::info!("Draining async notification handlers");

        let start = Instant::now();
        let poll_interval = Duration::from_millis(10);

        loop {
            let pending = self.in_flight();

            if pending == 0 {
                tracing::info!("All async notification handlers completed");
                return Ok(());
            }

            if start.elapsed() >= timeout {
                tracing::error!(
                    in_flight = pending,
                    "Drain timeout: {} async notification handlers still running", pending
                );
                return Err(MediatorError::Timeout(timeout));
            }

            tracing::trace!(
                in_flight = pending,
                elapsed_ms = start.elapsed().as_millis(),
                "Waiting for async notification handlers"
            );

            tokio::time::sleep(poll_interval).await;
        }
    }

    /// [`drain`](Self::drain) with the configured drain timeout.
    ///
    /// # Errors
    ///
    /// Same as [`drain`](Self::drain).
    pub async fn shutdown(&self) -> Result<(), MediatorError> {
        self.drain(self.config.drain_timeout).await
    }
}

impl Default for Mediator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Mediator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mediator")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("behaviors", &self.behavior_names())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use composable_mediator_core::behavior::{Next, behavior_fn};
    use composable_mediator_core::handler::notification_fn;
    use std::sync::atomic::AtomicBool;

    struct Ping;

    #[tokio::test]
    async fn not_found_runs_no_behavior() {
        let mediator = Mediator::new();
        let touched = Arc::new(AtomicBool::new(false));
        mediator.add_pipeline_behavior(behavior_fn("probe", {
            let touched = Arc::clone(&touched);
            move |ctx, _req, next: composable_mediator_core::behavior::Next| {
                touched.store(true, Ordering::SeqCst);
                next.run(ctx)
            }
        }));

        let error = mediator
            .send(Context::background(), Request::new("Missing", Ping))
            .await
            .unwrap_err();

        assert!(error.is_not_found());
        assert_eq!(error.to_string(), "no handler registered for request: Missing");
        assert!(!touched.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn send_typed_reports_unexpected_response() {
        let mediator = Mediator::new();
        mediator
            .register_query("Ping", |_ctx, _q: Arc<Ping>| async { Ok("pong") })
            .unwrap();

        let error = mediator
            .send_typed::<_, u64>(Context::background(), "Ping", Ping)
            .await
            .unwrap_err();
        assert!(matches!(error, MediatorError::UnexpectedResponse { .. }));

        let pong: &str = mediator
            .send_typed(Context::background(), "Ping", Ping)
            .await
            .unwrap();
        assert_eq!(pong, "pong");
    }

    #[tokio::test]
    async fn publish_attaches_context_correlation_id() {
        let mediator = Mediator::new();
        let seen = Arc::new(std::sync::Mutex::new(None));
        mediator
            .register_notification_handler("Pinged", notification_fn({
                let seen = Arc::clone(&seen);
                move |_ctx, notification: Notification| {
                    *seen.lock().unwrap() = notification.correlation_id().map(str::to_string);
                    async { Ok(()) }
                }
            }))
            .unwrap();

        mediator
            .publish(
                Context::background().with_correlation_id("req-7"),
                Notification::new("Pinged", Ping),
            )
            .await
            .unwrap();

        assert_eq!(seen.lock().unwrap().as_deref(), Some("req-7"));
    }

    #[test]
    fn publish_async_outside_runtime_drops_notification() {
        let mediator = Mediator::new();
        mediator
            .register_notification_handler("Pinged", notification_fn(|_ctx, _n| async { Ok(()) }))
            .unwrap();

        let spawned =
            mediator.publish_async(Context::background(), Notification::new("Pinged", Ping));
        assert_eq!(spawned, 0);
        assert_eq!(mediator.in_flight(), 0);
    }

    #[tokio::test]
    async fn drain_times_out_while_handler_blocks() {
        let mediator = Mediator::new();
        let (release, wait) = tokio::sync::oneshot::channel::<()>();
        let wait = Arc::new(tokio::sync::Mutex::new(Some(wait)));
        mediator
            .register_notification_handler("Slow", notification_fn(move |_ctx, _n| {
                let wait = Arc::clone(&wait);
                async move {
                    if let Some(wait) = wait.lock().await.take() {
                        let _ = wait.await;
                    }
                    Ok(())
                }
            }))
            .unwrap();

        assert_eq!(
            mediator.publish_async(Context::background(), Notification::new("Slow", Ping)),
            1
        );
        assert_eq!(mediator.in_flight(), 1);

        let error = mediator.drain(Duration::from_millis(30)).await.unwrap_err();
        assert!(matches!(error, MediatorError::Timeout(_)));

        release.send(()).unwrap();
        mediator.drain(Duration::from_secs(1)).await.unwrap();
        assert_eq!(mediator.in_flight(), 0);
    }

    #[test]
    fn behavior_names_are_outermost_first() {
        let mediator = Mediator::new();
        mediator
            .add_pipeline_behavior(behavior_fn("outer", |ctx, _req, next: Next| next.run(ctx)))
            .add_pipeline_behavior(behavior_fn("inner", |ctx, _req, next: Next| next.run(ctx)));
        assert_eq!(mediator.behavior_names(), vec!["outer", "inner"]);
    }
}
