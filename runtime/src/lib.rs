//! # Composable Mediator Runtime
//!
//! Runtime implementation of the in-process mediator.
//!
//! ## Core Components
//!
//! - **Mediator**: name-keyed dispatch of requests and fan-out of notifications
//! - **Handler Registry**: request handlers and notification subscribers
//! - **Pipeline**: composes behaviors around the terminal handler
//! - **Behaviors**: logging, validation, unit of work, recovery, timeout
//! - **Event Dispatcher**: persists aggregates, then publishes their domain events
//!
//! ## Example
//!
//! ```
//! use composable_mediator_runtime::Mediator;
//! use composable_mediator_runtime::behaviors::{LoggingBehavior, RecoveryBehavior};
//! use composable_mediator_core::context::Context;
//! use composable_mediator_core::notification::Notification;
//! use std::sync::Arc;
//!
//! struct OrderCreated { order_id: i64 }
//!
//! # tokio_test::block_on(async {
//! let mediator = Arc::new(Mediator::new());
//! mediator
//!     .add_pipeline_behavior(RecoveryBehavior)
//!     .add_pipeline_behavior(LoggingBehavior);
//!
//! mediator
//!     .register_notification("OrderCreated", |_ctx, event: Arc<OrderCreated>| async move {
//!         assert_eq!(event.order_id, 123);
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! mediator
//!     .publish(Context::background(), Notification::new("OrderCreated", OrderCreated { order_id: 123 }))
//!     .await
//!     .unwrap();
//! # });
//! ```

/// Built-in pipeline behaviors
pub mod behaviors;

/// Mediator configuration
pub mod config;

/// Publish after persist
pub mod events;

/// The dispatcher
pub mod mediator;

/// Prometheus metrics for observability
pub mod metrics;

/// Pipeline composition
pub mod pipeline;

/// Handler registry
pub mod registry;

pub use config::{ConfigError, DuplicatePolicy, MediatorConfig, PublishStrategy};
pub use events::{DispatchReport, EventDispatcher, Persist, PublishFailure};
pub use mediator::Mediator;
pub use registry::HandlerRegistry;
