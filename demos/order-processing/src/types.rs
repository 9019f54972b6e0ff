//! Core domain types for the Order Processing demo.
//!
//! Two aggregates live here: [`Order`], which is created and then paid exactly
//! once, and [`DeliveryRecord`], which is scheduled when an order is created.
//! Both accumulate domain events that are published only after the aggregate
//! has been persisted.

use chrono::{DateTime, Utc};
use composable_mediator_core::aggregate::{AggregateRoot, DomainEvents};
use composable_mediator_core::environment::Clock;
use composable_mediator_core::error::ValidationErrors;
use composable_mediator_core::event::DomainEvent;
use composable_mediator_runtime::behaviors::Validate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Request and notification names used by the order module.
pub mod names {
    /// Create a new order
    pub const CREATE_ORDER: &str = "CreateOrder";
    /// Pay an existing order
    pub const PAY_ORDER: &str = "PayOrder";
    /// Read an order
    pub const GET_ORDER: &str = "GetOrder";
    /// Schedule delivery for an order
    pub const DELIVER_GOODS: &str = "DeliverGoods";
    /// Domain event: order created
    pub const ORDER_CREATED: &str = "OrderCreated";
    /// Domain event: order paid
    pub const ORDER_PAID: &str = "OrderPaid";
    /// Domain event: delivery scheduled
    pub const DELIVERY_SCHEDULED: &str = "DeliveryScheduled";
    /// Integration event announced to other modules once an order is paid
    pub const PAYMENT_CONFIRMED: &str = "PaymentConfirmed";
}

/// Unique identifier for an order
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(i64);

impl OrderId {
    /// Creates a new `OrderId`
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the inner value
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a delivery record
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeliveryId(i64);

impl DeliveryId {
    /// Creates a new `DeliveryId`
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the inner value
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Business rule violations of the order module.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// Orders need a name
    #[error("order name is required")]
    MissingName,

    /// Orders need at least one item
    #[error("order count must be at least 1")]
    EmptyOrder,

    /// An order can only be paid once
    #[error("order {0} is already paid")]
    AlreadyPaid(OrderId),

    /// No order with this id
    #[error("order {0} not found")]
    NotFound(OrderId),
}

// ========== Events ==========

/// Events emitted by [`Order`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderEvent {
    /// The order was created
    Created {
        /// Order that was created
        order_id: OrderId,
        /// Order name
        name: String,
        /// Number of items
        count: u32,
        /// When it happened
        at: DateTime<Utc>,
    },
    /// The order was paid
    Paid {
        /// Order that was paid
        order_id: OrderId,
        /// When it happened
        at: DateTime<Utc>,
    },
}

impl OrderEvent {
    /// Order the event belongs to
    #[must_use]
    pub const fn order_id(&self) -> OrderId {
        match self {
            Self::Created { order_id, .. } | Self::Paid { order_id, .. } => *order_id,
        }
    }
}

impl DomainEvent for OrderEvent {
    fn event_name(&self) -> &'static str {
        match self {
            Self::Created { .. } => names::ORDER_CREATED,
            Self::Paid { .. } => names::ORDER_PAID,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Self::Created { at, .. } | Self::Paid { at, .. } => *at,
        }
    }
}

/// Emitted by [`DeliveryRecord`] when it is scheduled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryScheduled {
    /// The new delivery record
    pub delivery_id: DeliveryId,
    /// Order being delivered
    pub order_id: OrderId,
    /// When it happened
    pub at: DateTime<Utc>,
}

impl DomainEvent for DeliveryScheduled {
    fn event_name(&self) -> &'static str {
        names::DELIVERY_SCHEDULED
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.at
    }
}

/// Integration event published asynchronously once an order is paid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmed {
    /// Order that was paid
    pub order_id: OrderId,
    /// When payment was recorded
    pub paid_at: DateTime<Utc>,
}

// ========== Aggregates ==========

/// Order aggregate.
#[derive(Clone, Debug)]
pub struct Order {
    id: OrderId,
    name: String,
    count: u32,
    paid: bool,
    events: DomainEvents<OrderEvent>,
}

impl Order {
    /// Create an order and record [`OrderEvent::Created`].
    ///
    /// # Errors
    ///
    /// [`OrderError::MissingName`] or [`OrderError::EmptyOrder`].
    pub fn create(
        id: OrderId,
        name: impl Into<String>,
        count: u32,
        clock: &dyn Clock,
    ) -> Result<Self, OrderError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(OrderError::MissingName);
        }
        if count == 0 {
            return Err(OrderError::EmptyOrder);
        }

        let mut order = Self {
            id,
            name: name.clone(),
            count,
            paid: false,
            events: DomainEvents::new(),
        };
        order.add_domain_event(OrderEvent::Created {
            order_id: id,
            name,
            count,
            at: clock.now(),
        });
        Ok(order)
    }

    /// Mark the order paid and record [`OrderEvent::Paid`].
    ///
    /// # Errors
    ///
    /// [`OrderError::AlreadyPaid`] if the order was paid before; no event is
    /// recorded in that case.
    pub fn pay(&mut self, clock: &dyn Clock) -> Result<(), OrderError> {
        if self.paid {
            return Err(OrderError::AlreadyPaid(self.id));
        }
        self.paid = true;
        self.add_domain_event(OrderEvent::Paid {
            order_id: self.id,
            at: clock.now(),
        });
        Ok(())
    }

    /// Order name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of items
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Whether the order was paid
    #[must_use]
    pub const fn is_paid(&self) -> bool {
        self.paid
    }

    /// Read model of this order
    #[must_use]
    pub fn view(&self) -> OrderView {
        OrderView {
            id: self.id,
            name: self.name.clone(),
            count: self.count,
            paid: self.paid,
        }
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;
    type Event = OrderEvent;

    fn id(&self) -> OrderId {
        self.id
    }

    fn events(&self) -> &DomainEvents<OrderEvent> {
        &self.events
    }

    fn events_mut(&mut self) -> &mut DomainEvents<OrderEvent> {
        &mut self.events
    }
}

/// Delivery scheduled for a created order.
#[derive(Clone, Debug)]
pub struct DeliveryRecord {
    id: DeliveryId,
    order_id: OrderId,
    scheduled_at: DateTime<Utc>,
    events: DomainEvents<DeliveryScheduled>,
}

impl DeliveryRecord {
    /// Schedule delivery of `order_id` and record [`DeliveryScheduled`]
    #[must_use]
    pub fn schedule(id: DeliveryId, order_id: OrderId, clock: &dyn Clock) -> Self {
        let at = clock.now();
        let mut record = Self {
            id,
            order_id,
            scheduled_at: at,
            events: DomainEvents::new(),
        };
        record.add_domain_event(DeliveryScheduled {
            delivery_id: id,
            order_id,
            at,
        });
        record
    }

    /// Order being delivered
    #[must_use]
    pub const fn order_id(&self) -> OrderId {
        self.order_id
    }

    /// When delivery was scheduled
    #[must_use]
    pub const fn scheduled_at(&self) -> DateTime<Utc> {
        self.scheduled_at
    }
}

impl AggregateRoot for DeliveryRecord {
    type Id = DeliveryId;
    type Event = DeliveryScheduled;

    fn id(&self) -> DeliveryId {
        self.id
    }

    fn events(&self) -> &DomainEvents<DeliveryScheduled> {
        &self.events
    }

    fn events_mut(&mut self) -> &mut DomainEvents<DeliveryScheduled> {
        &mut self.events
    }
}

// ========== Requests ==========

/// Command: create an order. Responds with the new [`OrderId`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    /// Order name
    pub name: String,
    /// Number of items
    pub count: u32,
}

impl Validate for CreateOrder {
    fn validate(&self, errors: &mut ValidationErrors) {
        if self.name.trim().is_empty() {
            errors.add("name", "is required");
        }
        if self.count == 0 {
            errors.add("count", "must be at least 1");
        }
    }
}

/// Command: pay an order. Responds with `()`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayOrder {
    /// Order to pay
    pub order_id: OrderId,
}

/// Query: read an order. Responds with an [`OrderView`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetOrder {
    /// Order to read
    pub order_id: OrderId,
}

/// Command: schedule delivery. Responds with the new [`DeliveryId`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverGoods {
    /// Order to deliver
    pub order_id: OrderId,
}

/// Read model returned by [`GetOrder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderView {
    /// Order id
    pub id: OrderId,
    /// Order name
    pub name: String,
    /// Number of items
    pub count: u32,
    /// Whether the order was paid
    pub paid: bool,
}
