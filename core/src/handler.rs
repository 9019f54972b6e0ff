//! Request and notification handler traits.
//!
//! Handlers are stored as trait objects (`Arc<dyn RequestHandler>`), so the traits
//! return explicit boxed futures instead of using `async fn` and stay dyn
//! compatible. Repositories and units of work follow the same shape.
//!
//! Most handlers are closures. [`handler_fn`] and [`notification_fn`] adapt an
//! untyped closure; [`typed_handler`] and [`typed_notification`] downcast the
//! payload once, at the registration boundary, so handler bodies work with
//! concrete types.
//!
//! # Example
//!
//! ```
//! use composable_mediator_core::context::Context;
//! use composable_mediator_core::handler::{RequestHandler, typed_handler};
//! use composable_mediator_core::request::{Request, downcast_response};
//! use composable_mediator_core::error::MediatorError;
//! use std::sync::Arc;
//!
//! struct CreateOrder { name: String, count: u32 }
//!
//! let handler = typed_handler(|_ctx: Context, cmd: Arc<CreateOrder>| async move {
//!     if cmd.name.is_empty() {
//!         return Err(MediatorError::handler("order name required"));
//!     }
//!     Ok(123_i64)
//! });
//!
//! # tokio_test::block_on(async {
//! let request = Request::new("CreateOrder", CreateOrder { name: "widget".into(), count: 2 });
//! let response = handler.handle(Context::background(), request).await.unwrap();
//! assert_eq!(downcast_response::<i64>("CreateOrder", response).unwrap(), 123);
//! # });
//! ```

use crate::context::Context;
use crate::error::MediatorError;
use crate::notification::Notification;
use crate::request::{Request, Response};
use futures::future::BoxFuture;
use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Outcome of a request handler or pipeline link.
pub type HandlerResult = Result<Response, MediatorError>;

/// Handles requests bound to one name.
///
/// Exactly one request handler is bound per name; commands and queries share
/// the namespace.
pub trait RequestHandler: Send + Sync {
    /// Handle a request.
    ///
    /// # Errors
    ///
    /// Business failures are returned as [`MediatorError::Handler`]; a payload of
    /// the wrong type as [`MediatorError::InvalidRequest`].
    fn handle(&self, ctx: Context, request: Request) -> BoxFuture<'_, HandlerResult>;
}

/// Handles notifications published under one name.
///
/// Any number of notification handlers may subscribe to the same name.
pub trait NotificationHandler: Send + Sync {
    /// Handle a notification.
    ///
    /// # Errors
    ///
    /// During a synchronous publish an error stops the remaining subscribers
    /// (fail-fast). During an async publish it is logged and dropped.
    fn handle(
        &self,
        ctx: Context,
        notification: Notification,
    ) -> BoxFuture<'_, Result<(), MediatorError>>;
}

impl<H: RequestHandler + ?Sized> RequestHandler for Arc<H> {
    fn handle(&self, ctx: Context, request: Request) -> BoxFuture<'_, HandlerResult> {
        (**self).handle(ctx, request)
    }
}

impl<H: NotificationHandler + ?Sized> NotificationHandler for Arc<H> {
    fn handle(
        &self,
        ctx: Context,
        notification: Notification,
    ) -> BoxFuture<'_, Result<(), MediatorError>> {
        (**self).handle(ctx, notification)
    }
}

/// Request handler backed by an untyped closure. Created by [`handler_fn`].
#[derive(Clone)]
pub struct HandlerFn<F> {
    f: F,
}

/// Adapt `Fn(Context, Request) -> Future<Output = HandlerResult>` into a [`RequestHandler`].
pub const fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Context, Request) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    HandlerFn { f }
}

impl<F, Fut> RequestHandler for HandlerFn<F>
where
    F: Fn(Context, Request) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn handle(&self, ctx: Context, request: Request) -> BoxFuture<'_, HandlerResult> {
        Box::pin((self.f)(ctx, request))
    }
}

/// Request handler that downcasts its payload to `T` before calling the closure.
///
/// Created by [`typed_handler`]. The closure's `Ok` value is boxed into the
/// [`Response`].
pub struct TypedHandler<T, R, F> {
    f: F,
    _marker: PhantomData<fn(T) -> R>,
}

/// Adapt `Fn(Context, Arc<T>) -> Future<Output = Result<R, MediatorError>>` into a
/// [`RequestHandler`].
///
/// A payload that is not a `T` yields [`MediatorError::InvalidRequest`] without
/// calling the closure.
pub const fn typed_handler<T, R, F, Fut>(f: F) -> TypedHandler<T, R, F>
where
    T: Any + Send + Sync,
    R: Any + Send,
    F: Fn(Context, Arc<T>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, MediatorError>> + Send + 'static,
{
    TypedHandler {
        f,
        _marker: PhantomData,
    }
}

impl<T, R, F, Fut> RequestHandler for TypedHandler<T, R, F>
where
    T: Any + Send + Sync,
    R: Any + Send,
    F: Fn(Context, Arc<T>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, MediatorError>> + Send + 'static,
{
    fn handle(&self, ctx: Context, request: Request) -> BoxFuture<'_, HandlerResult> {
        let payload = match request.downcast_arc::<T>() {
            Ok(payload) => payload,
            Err(error) => return Box::pin(futures::future::ready(Err(error))),
        };
        let fut = (self.f)(ctx, payload);
        Box::pin(async move { fut.await.map(|value| Box::new(value) as Response) })
    }
}

/// Notification handler backed by an untyped closure. Created by [`notification_fn`].
#[derive(Clone)]
pub struct NotificationFn<F> {
    f: F,
}

/// Adapt `Fn(Context, Notification) -> Future<Output = Result<(), MediatorError>>`
/// into a [`NotificationHandler`].
pub const fn notification_fn<F, Fut>(f: F) -> NotificationFn<F>
where
    F: Fn(Context, Notification) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), MediatorError>> + Send + 'static,
{
    NotificationFn { f }
}

impl<F, Fut> NotificationHandler for NotificationFn<F>
where
    F: Fn(Context, Notification) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), MediatorError>> + Send + 'static,
{
    fn handle(
        &self,
        ctx: Context,
        notification: Notification,
    ) -> BoxFuture<'_, Result<(), MediatorError>> {
        Box::pin((self.f)(ctx, notification))
    }
}

/// Notification handler that only reacts to payloads of type `T`.
///
/// Created by [`typed_notification`]. Notifications carrying another payload
/// type are ignored (`Ok(())`): several event types may legitimately be
/// published under one name and a subscriber only cares about its own.
pub struct TypedNotification<T, F> {
    f: F,
    _marker: PhantomData<fn(T)>,
}

/// Adapt `Fn(Context, Arc<T>) -> Future<Output = Result<(), MediatorError>>` into a
/// [`NotificationHandler`] that skips payloads of other types.
pub const fn typed_notification<T, F, Fut>(f: F) -> TypedNotification<T, F>
where
    T: Any + Send + Sync,
    F: Fn(Context, Arc<T>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), MediatorError>> + Send + 'static,
{
    TypedNotification {
        f,
        _marker: PhantomData,
    }
}

impl<T, F, Fut> NotificationHandler for TypedNotification<T, F>
where
    T: Any + Send + Sync,
    F: Fn(Context, Arc<T>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), MediatorError>> + Send + 'static,
{
    fn handle(
        &self,
        ctx: Context,
        notification: Notification,
    ) -> BoxFuture<'_, Result<(), MediatorError>> {
        match Arc::clone(notification.payload()).downcast::<T>() {
            Ok(payload) => Box::pin((self.f)(ctx, payload)),
            Err(_) => Box::pin(futures::future::ready(Ok(()))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use crate::request::downcast_response;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CreateEmployee {
        name: String,
    }

    #[tokio::test]
    async fn handler_fn_passes_request_through() {
        let handler = handler_fn(|_ctx, request: Request| async move {
            let name = request.payload_as::<CreateEmployee>()?.name.clone();
            Ok::<_, MediatorError>(Box::new(name) as Response)
        });

        let response = handler
            .handle(
                Context::background(),
                Request::new("CreateEmployee", CreateEmployee { name: "ada".into() }),
            )
            .await
            .unwrap();

        assert_eq!(
            downcast_response::<String>("CreateEmployee", response).unwrap(),
            "ada"
        );
    }

    #[tokio::test]
    async fn typed_handler_rejects_foreign_payload_without_running() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = typed_handler({
            let calls = Arc::clone(&calls);
            move |_ctx, _cmd: Arc<CreateEmployee>| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            }
        });

        let error = handler
            .handle(Context::background(), Request::new("CreateEmployee", 42_u32))
            .await
            .unwrap_err();

        assert!(matches!(error, MediatorError::InvalidRequest { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn typed_handler_surfaces_business_error() {
        let handler = typed_handler(|_ctx, cmd: Arc<CreateEmployee>| async move {
            if cmd.name.is_empty() {
                return Err(MediatorError::handler("employee name required"));
            }
            Ok(())
        });

        let error = handler
            .handle(
                Context::background(),
                Request::new("CreateEmployee", CreateEmployee { name: String::new() }),
            )
            .await
            .unwrap_err();

        assert_eq!(error.to_string(), "employee name required");
    }

    #[tokio::test]
    async fn typed_notification_ignores_other_payloads() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = typed_notification({
            let calls = Arc::clone(&calls);
            move |_ctx, _event: Arc<String>| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            }
        });

        handler
            .handle(Context::background(), Notification::new("Joined", 1_i32))
            .await
            .unwrap();
        handler
            .handle(Context::background(), Notification::new("Joined", "ada".to_string()))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn arc_handlers_delegate() {
        let handler: Arc<dyn RequestHandler> =
            Arc::new(handler_fn(|_ctx, _req| async { Ok(Box::new(1_u8) as Response) }));
        let response = handler
            .handle(Context::background(), Request::new("One", ()))
            .await
            .unwrap();
        assert_eq!(downcast_response::<u8>("One", response).unwrap(), 1);
    }
}
