//! Request handlers and event subscribers for the order module.
//!
//! Commands persist their aggregate through an [`EventDispatcher`], so every
//! domain event is published only after the write succeeded:
//!
//! ```text
//! CreateOrder ─→ orders.add ─→ OrderCreated ─→ DeliverGoods ─→ deliveries.add ─→ DeliveryScheduled
//! PayOrder ────→ orders.update ─→ OrderPaid ─→ publish_async(PaymentConfirmed) ─→ outbox
//! ```
//!
//! Handlers hold the mediator weakly; the mediator owns the handlers.

use crate::types::{
    CreateOrder, DeliverGoods, DeliveryId, DeliveryRecord, GetOrder, Order, OrderError,
    OrderEvent, OrderId, OrderView, PayOrder, PaymentConfirmed, names,
};
use composable_mediator_core::aggregate::AggregateRoot;
use composable_mediator_core::context::Context;
use composable_mediator_core::environment::Clock;
use composable_mediator_core::error::MediatorError;
use composable_mediator_core::notification::Notification;
use composable_mediator_core::repository::Repository;
use composable_mediator_runtime::{EventDispatcher, Mediator, Persist};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Environment dependencies for the order handlers.
#[derive(Clone)]
pub struct OrderEnvironment {
    clock: Arc<dyn Clock>,
    next_order_id: Arc<AtomicI64>,
    next_delivery_id: Arc<AtomicI64>,
}

impl OrderEnvironment {
    /// Environment whose order and delivery ids both start at 1
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            next_order_id: Arc::new(AtomicI64::new(1)),
            next_delivery_id: Arc::new(AtomicI64::new(1)),
        }
    }

    /// Start order ids at `first`
    #[must_use]
    pub fn with_first_order_id(self, first: i64) -> Self {
        Self {
            next_order_id: Arc::new(AtomicI64::new(first)),
            ..self
        }
    }

    /// Clock used to timestamp domain events
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    fn next_order_id(&self) -> OrderId {
        OrderId::new(self.next_order_id.fetch_add(1, Ordering::SeqCst))
    }

    fn next_delivery_id(&self) -> DeliveryId {
        DeliveryId::new(self.next_delivery_id.fetch_add(1, Ordering::SeqCst))
    }
}

impl std::fmt::Debug for OrderEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderEnvironment")
            .field("next_order_id", &self.next_order_id)
            .field("next_delivery_id", &self.next_delivery_id)
            .finish_non_exhaustive()
    }
}

/// Repositories the order handlers write to.
#[derive(Clone)]
pub struct OrderRepositories {
    /// Order aggregates
    pub orders: Arc<dyn Repository<Order>>,
    /// Delivery records
    pub deliveries: Arc<dyn Repository<DeliveryRecord>>,
}

/// Payment confirmations that would be sent to customers.
#[derive(Debug, Clone, Default)]
pub struct ConfirmationOutbox(Arc<Mutex<Vec<PaymentConfirmed>>>);

impl ConfirmationOutbox {
    /// Empty outbox
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, confirmation: PaymentConfirmed) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(confirmation);
    }

    /// Confirmations sent so far
    #[must_use]
    pub fn sent(&self) -> Vec<PaymentConfirmed> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[derive(Clone)]
struct OrderHandlers {
    env: OrderEnvironment,
    repositories: OrderRepositories,
    outbox: ConfirmationOutbox,
    mediator: Weak<Mediator>,
}

/// Register every order command, query and subscriber on `mediator`.
///
/// # Errors
///
/// Returns [`MediatorError::DuplicateHandler`] if a name is already bound and
/// the mediator rejects duplicates.
pub fn register_order_module(
    mediator: &Arc<Mediator>,
    env: OrderEnvironment,
    repositories: OrderRepositories,
    outbox: ConfirmationOutbox,
) -> Result<(), MediatorError> {
    let handlers = OrderHandlers {
        env,
        repositories,
        outbox,
        mediator: Arc::downgrade(mediator),
    };

    let h = handlers.clone();
    mediator.register_command(names::CREATE_ORDER, move |ctx, cmd: Arc<CreateOrder>| {
        h.clone().create_order(ctx, cmd)
    })?;
    let h = handlers.clone();
    mediator.register_command(names::PAY_ORDER, move |ctx, cmd: Arc<PayOrder>| {
        h.clone().pay_order(ctx, cmd)
    })?;
    let h = handlers.clone();
    mediator.register_command(names::DELIVER_GOODS, move |ctx, cmd: Arc<DeliverGoods>| {
        h.clone().deliver_goods(ctx, cmd)
    })?;
    let h = handlers.clone();
    mediator.register_query(names::GET_ORDER, move |ctx, query: Arc<GetOrder>| {
        h.clone().get_order(ctx, query)
    })?;

    let h = handlers.clone();
    mediator.register_notification(names::ORDER_CREATED, move |ctx, event: Arc<OrderEvent>| {
        h.clone().on_order_created(ctx, event)
    })?;
    let h = handlers.clone();
    mediator.register_notification(names::ORDER_PAID, move |ctx, event: Arc<OrderEvent>| {
        h.clone().on_order_paid(ctx, event)
    })?;
    let h = handlers;
    mediator.register_notification(
        names::PAYMENT_CONFIRMED,
        move |ctx, confirmation: Arc<PaymentConfirmed>| {
            h.clone().send_confirmation(ctx, confirmation)
        },
    )?;

    tracing::debug!("Order module registered");
    Ok(())
}

impl OrderHandlers {
    fn mediator(&self) -> Result<Arc<Mediator>, MediatorError> {
        self.mediator
            .upgrade()
            .ok_or_else(|| MediatorError::handler("mediator has been dropped"))
    }

    fn dispatcher<A: AggregateRoot>(
        &self,
        repository: &Arc<dyn Repository<A>>,
    ) -> Result<EventDispatcher<A>, MediatorError> {
        Ok(EventDispatcher::new(self.mediator()?, Arc::clone(repository)))
    }

    async fn load(&self, ctx: &Context, order_id: OrderId) -> Result<Order, MediatorError> {
        self.repositories
            .orders
            .get(ctx, &order_id)
            .await?
            .ok_or_else(|| MediatorError::Handler(OrderError::NotFound(order_id).into()))
    }

    // ========== Requests ==========

    async fn create_order(
        self,
        ctx: Context,
        cmd: Arc<CreateOrder>,
    ) -> Result<OrderId, MediatorError> {
        let mut order = Order::create(
            self.env.next_order_id(),
            cmd.name.clone(),
            cmd.count,
            self.env.clock(),
        )
        .map_err(anyhow::Error::from)?;

        let report = self
            .dispatcher(&self.repositories.orders)?
            .persist_and_publish(&ctx, &mut order, Persist::Add)
            .await?;

        tracing::info!(
            order_id = %order.id(),
            published = report.published,
            failed = report.failures.len(),
            "Order created"
        );
        Ok(order.id())
    }

    async fn pay_order(self, ctx: Context, cmd: Arc<PayOrder>) -> Result<(), MediatorError> {
        let mut order = self.load(&ctx, cmd.order_id).await?;
        order.pay(self.env.clock()).map_err(anyhow::Error::from)?;

        self.dispatcher(&self.repositories.orders)?
            .persist_and_publish(&ctx, &mut order, Persist::Update)
            .await?;

        tracing::info!(order_id = %cmd.order_id, "Order paid");
        Ok(())
    }

    async fn deliver_goods(
        self,
        ctx: Context,
        cmd: Arc<DeliverGoods>,
    ) -> Result<DeliveryId, MediatorError> {
        let mut record =
            DeliveryRecord::schedule(self.env.next_delivery_id(), cmd.order_id, self.env.clock());

        self.dispatcher(&self.repositories.deliveries)?
            .persist_and_publish(&ctx, &mut record, Persist::Add)
            .await?;

        Ok(record.id())
    }

    async fn get_order(
        self,
        ctx: Context,
        query: Arc<GetOrder>,
    ) -> Result<OrderView, MediatorError> {
        Ok(self.load(&ctx, query.order_id).await?.view())
    }

    // ========== Subscribers ==========

    async fn on_order_created(
        self,
        ctx: Context,
        event: Arc<OrderEvent>,
    ) -> Result<(), MediatorError> {
        let &OrderEvent::Created { order_id, .. } = event.as_ref() else {
            return Ok(());
        };

        let delivery_id: DeliveryId = self
            .mediator()?
            .send_typed(ctx, names::DELIVER_GOODS, DeliverGoods { order_id })
            .await?;

        tracing::info!(%order_id, %delivery_id, "Delivery scheduled");
        Ok(())
    }

    async fn on_order_paid(
        self,
        ctx: Context,
        event: Arc<OrderEvent>,
    ) -> Result<(), MediatorError> {
        let &OrderEvent::Paid { order_id, at } = event.as_ref() else {
            return Ok(());
        };

        let confirmation = PaymentConfirmed {
            order_id,
            paid_at: at,
        };
        let spawned = self.mediator()?.publish_async(
            ctx,
            Notification::new(names::PAYMENT_CONFIRMED, confirmation).with_occurred_at(at),
        );

        tracing::debug!(%order_id, spawned, "Payment confirmation queued");
        Ok(())
    }

    async fn send_confirmation(
        self,
        _ctx: Context,
        confirmation: Arc<PaymentConfirmed>,
    ) -> Result<(), MediatorError> {
        tracing::info!(order_id = %confirmation.order_id, "Sending payment confirmation");
        self.outbox.push(confirmation.as_ref().clone());
        Ok(())
    }
}
