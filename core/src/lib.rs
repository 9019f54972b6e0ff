//! # Composable Mediator Core
//!
//! Contracts for an in-process mediator that dispatches commands, queries and
//! notifications by name.
//!
//! This crate holds the types every participant agrees on. The dispatcher
//! itself lives in `composable-mediator-runtime`.
//!
//! ## Core Concepts
//!
//! - **Request**: a command or query, routed by name to exactly one handler
//! - **Notification**: a published fact, delivered to zero or more subscribers
//! - **Pipeline behavior**: an interceptor wrapped around every request
//! - **Aggregate root**: a domain object that accumulates domain events
//! - **Repository**: persists aggregates before their events are published
//!
//! ## Dispatch flow
//!
//! ```text
//! send(ctx, request)
//!   → B1 → B2 → … → handler(request)
//!   ← B1 ← B2 ← … ← result
//!
//! publish(ctx, notification)
//!   → subscriber 1 → subscriber 2 → …   (registration order, stop on first error)
//! ```
//!
//! ## Example
//!
//! ```
//! use composable_mediator_core::prelude::*;
//! use std::sync::Arc;
//!
//! struct GetGreeting { name: String }
//!
//! let handler = typed_handler(|_ctx: Context, query: Arc<GetGreeting>| async move {
//!     Ok(format!("hello, {}", query.name))
//! });
//!
//! # tokio_test::block_on(async {
//! let response = handler
//!     .handle(Context::background(), Request::new("GetGreeting", GetGreeting { name: "ada".into() }))
//!     .await
//!     .unwrap();
//! assert_eq!(downcast_response::<String>("GetGreeting", response).unwrap(), "hello, ada");
//! # });
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use futures::future::BoxFuture;

pub mod aggregate;
pub mod behavior;
pub mod context;
pub mod environment;
pub mod error;
pub mod event;
pub mod handler;
pub mod notification;
pub mod repository;
pub mod request;

/// Everything a handler module usually needs.
pub mod prelude {
    pub use crate::aggregate::{AggregateRoot, DomainEvents};
    pub use crate::behavior::{Next, PipelineBehavior, behavior_fn};
    pub use crate::context::{CancellationHandle, Context};
    pub use crate::environment::{Clock, SystemClock};
    pub use crate::error::{FieldViolation, MediatorError, ValidationErrors};
    pub use crate::event::DomainEvent;
    pub use crate::handler::{
        HandlerResult, NotificationHandler, RequestHandler, handler_fn, notification_fn,
        typed_handler, typed_notification,
    };
    pub use crate::notification::Notification;
    pub use crate::repository::{Repository, RepositoryError};
    pub use crate::request::{Payload, Request, Response, downcast_response, respond};
    pub use futures::future::BoxFuture;
}
