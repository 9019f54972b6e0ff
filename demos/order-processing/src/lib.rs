//! Order Processing demo for the Composable Mediator.
//!
//! Shows a small order module wired through the mediator:
//!
//! - Commands (`CreateOrder`, `PayOrder`, `DeliverGoods`) and a query (`GetOrder`)
//!   dispatched by name with [`Mediator::send_typed`]
//! - Pipeline behaviors for recovery, logging, timeouts and validation
//! - Aggregates that record domain events, published only after persistence
//! - An event handler that sends a follow-up command (`OrderCreated` → `DeliverGoods`)
//! - Fire-and-forget fan-out with `publish_async` (`PaymentConfirmed`)
//!
//! # Example Usage
//!
//! ```no_run
//! use order_processing::{OrderApp, OrderEnvironment};
//! use composable_mediator_core::context::Context;
//! use composable_mediator_core::environment::SystemClock;
//! use composable_mediator_runtime::MediatorConfig;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let app = OrderApp::new(
//!     MediatorConfig::default(),
//!     OrderEnvironment::new(Arc::new(SystemClock)),
//! )?;
//!
//! let ctx = Context::background();
//! let order_id = app.create_order(ctx.clone(), "widget", 2).await?;
//! app.pay_order(ctx.clone(), order_id).await?;
//!
//! let order = app.get_order(ctx, order_id).await?;
//! assert!(order.paid);
//!
//! app.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod handlers;
pub mod types;

pub use handlers::{ConfirmationOutbox, OrderEnvironment, OrderRepositories, register_order_module};
pub use types::{
    CreateOrder, DeliverGoods, DeliveryId, DeliveryRecord, GetOrder, Order, OrderError, OrderEvent,
    OrderId, OrderView, PayOrder, PaymentConfirmed,
};

use composable_mediator_core::context::Context;
use composable_mediator_core::error::MediatorError;
use composable_mediator_runtime::behaviors::{
    LoggingBehavior, RecoveryBehavior, TimeoutBehavior, ValidationBehavior,
};
use composable_mediator_runtime::{Mediator, MediatorConfig};
use composable_mediator_testing::InMemoryRepository;
use std::sync::Arc;
use types::names;

/// The order module assembled on a mediator with in-memory storage.
#[derive(Debug, Clone)]
pub struct OrderApp {
    mediator: Arc<Mediator>,
    orders: InMemoryRepository<Order>,
    deliveries: InMemoryRepository<DeliveryRecord>,
    outbox: ConfirmationOutbox,
}

impl OrderApp {
    /// Build the mediator, its behaviors and the order module.
    ///
    /// # Errors
    ///
    /// Returns an error if the order handlers cannot be registered.
    pub fn new(config: MediatorConfig, env: OrderEnvironment) -> Result<Self, MediatorError> {
        let mediator = Arc::new(Mediator::with_config(config));
        mediator
            .add_pipeline_behavior(RecoveryBehavior)
            .add_pipeline_behavior(LoggingBehavior)
            .add_pipeline_behavior(TimeoutBehavior::from_config(mediator.config()))
            .add_pipeline_behavior(ValidationBehavior::new().validate::<CreateOrder>());

        let orders = InMemoryRepository::new();
        let deliveries = InMemoryRepository::new();
        let outbox = ConfirmationOutbox::new();

        register_order_module(
            &mediator,
            env,
            OrderRepositories {
                orders: Arc::new(orders.clone()),
                deliveries: Arc::new(deliveries.clone()),
            },
            outbox.clone(),
        )?;

        Ok(Self {
            mediator,
            orders,
            deliveries,
            outbox,
        })
    }

    /// The mediator everything is registered on
    #[must_use]
    pub const fn mediator(&self) -> &Arc<Mediator> {
        &self.mediator
    }

    /// Stored orders
    #[must_use]
    pub const fn orders(&self) -> &InMemoryRepository<Order> {
        &self.orders
    }

    /// Stored delivery records
    #[must_use]
    pub const fn deliveries(&self) -> &InMemoryRepository<DeliveryRecord> {
        &self.deliveries
    }

    /// Payment confirmations sent so far
    #[must_use]
    pub const fn outbox(&self) -> &ConfirmationOutbox {
        &self.outbox
    }

    /// Send `CreateOrder`.
    ///
    /// # Errors
    ///
    /// [`MediatorError::Validation`] for an empty name or zero count, or any
    /// persistence error.
    pub async fn create_order(
        &self,
        ctx: Context,
        name: impl Into<String>,
        count: u32,
    ) -> Result<OrderId, MediatorError> {
        self.mediator
            .send_typed(
                ctx,
                names::CREATE_ORDER,
                CreateOrder {
                    name: name.into(),
                    count,
                },
            )
            .await
    }

    /// Send `PayOrder`.
    ///
    /// # Errors
    ///
    /// Fails if the order does not exist or is already paid.
    pub async fn pay_order(&self, ctx: Context, order_id: OrderId) -> Result<(), MediatorError> {
        self.mediator
            .send_typed(ctx, names::PAY_ORDER, PayOrder { order_id })
            .await
    }

    /// Send the `GetOrder` query.
    ///
    /// # Errors
    ///
    /// Fails if the order does not exist.
    pub async fn get_order(
        &self,
        ctx: Context,
        order_id: OrderId,
    ) -> Result<OrderView, MediatorError> {
        self.mediator
            .send_typed(ctx, names::GET_ORDER, GetOrder { order_id })
            .await
    }

    /// Wait for in-flight async subscribers, bounded by the configured drain timeout.
    ///
    /// # Errors
    ///
    /// [`MediatorError::Timeout`] if subscribers are still running at the deadline.
    pub async fn shutdown(&self) -> Result<(), MediatorError> {
        self.mediator.shutdown().await
    }
}
