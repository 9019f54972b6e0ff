//! Event-bearing aggregates.
//!
//! An aggregate records domain events as a side effect of its state-changing
//! operations. It does not know about the mediator: the application layer
//! persists the aggregate, publishes the pending events, then clears them.
//!
//! ```text
//! order.pay()              → pending: [OrderPaid]
//! repository.update(order) → persisted
//! mediator.publish(...)    → subscribers run
//! order.clear_domain_events() → pending: []
//! ```
//!
//! Publishing before persisting is a bug: a subscriber reacting to
//! `"OrderCreated"` must be able to load the order.
//!
//! # Invariants
//!
//! - Events are append-only until cleared.
//! - Reading events never clears them.
//! - Clearing is idempotent.

use crate::event::DomainEvent;
use std::fmt;

/// Ordered queue of pending domain events, embedded in an aggregate.
#[derive(Clone, PartialEq, Eq)]
pub struct DomainEvents<E> {
    pending: Vec<E>,
}

impl<E> DomainEvents<E> {
    /// Create an empty queue
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Append an event
    pub fn push(&mut self, event: E) {
        self.pending.push(event);
    }

    /// Pending events in append order
    #[must_use]
    pub fn as_slice(&self) -> &[E] {
        &self.pending
    }

    /// Iterate pending events in append order
    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.pending.iter()
    }

    /// Number of pending events
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// `true` when nothing is pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop every pending event. Clearing an empty queue is a no-op.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Remove and return every pending event.
    pub fn take(&mut self) -> Vec<E> {
        std::mem::take(&mut self.pending)
    }
}

impl<E> Default for DomainEvents<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: DomainEvent> fmt::Debug for DomainEvents<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.pending.iter().map(DomainEvent::event_name))
            .finish()
    }
}

impl<'a, E> IntoIterator for &'a DomainEvents<E> {
    type Item = &'a E;
    type IntoIter = std::slice::Iter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A consistency boundary that accumulates domain events.
///
/// Implementors only provide access to their embedded [`DomainEvents`]; the
/// event operations come with default implementations.
///
/// # Example
///
/// ```
/// use composable_mediator_core::aggregate::{AggregateRoot, DomainEvents};
/// use composable_mediator_core::event::DomainEvent;
/// use chrono::{DateTime, Utc};
///
/// #[derive(Clone, Debug)]
/// struct EmployeeJoined { at: DateTime<Utc> }
///
/// impl DomainEvent for EmployeeJoined {
///     fn event_name(&self) -> &'static str { "EmployeeJoined" }
///     fn occurred_at(&self) -> DateTime<Utc> { self.at }
/// }
///
/// struct Employee {
///     id: i64,
///     events: DomainEvents<EmployeeJoined>,
/// }
///
/// impl AggregateRoot for Employee {
///     type Id = i64;
///     type Event = EmployeeJoined;
///
///     fn id(&self) -> i64 { self.id }
///     fn events(&self) -> &DomainEvents<EmployeeJoined> { &self.events }
///     fn events_mut(&mut self) -> &mut DomainEvents<EmployeeJoined> { &mut self.events }
/// }
///
/// let mut employee = Employee { id: 1, events: DomainEvents::new() };
/// employee.add_domain_event(EmployeeJoined { at: Utc::now() });
/// assert_eq!(employee.domain_events().len(), 1);
///
/// employee.clear_domain_events();
/// employee.clear_domain_events();
/// assert!(employee.domain_events().is_empty());
/// ```
pub trait AggregateRoot: Send + Sync {
    /// Identifier type
    type Id: Clone + fmt::Debug + Send + Sync;

    /// Domain event type emitted by this aggregate
    type Event: DomainEvent + Clone;

    /// The aggregate's identifier
    fn id(&self) -> Self::Id;

    /// Pending events
    fn events(&self) -> &DomainEvents<Self::Event>;

    /// Pending events, mutable
    fn events_mut(&mut self) -> &mut DomainEvents<Self::Event>;

    /// Append an event to the pending queue.
    fn add_domain_event(&mut self, event: Self::Event) {
        self.events_mut().push(event);
    }

    /// Read-only view of the pending events, in append order.
    fn domain_events(&self) -> &[Self::Event] {
        self.events().as_slice()
    }

    /// Drop every pending event. Idempotent.
    fn clear_domain_events(&mut self) {
        self.events_mut().clear();
    }

    /// Remove and return every pending event.
    fn take_domain_events(&mut self) -> Vec<Self::Event> {
        self.events_mut().take()
    }
}
