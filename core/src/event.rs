//! Domain event trait.
//!
//! Domain events describe things that already happened inside an aggregate
//! (`"OrderCreated"`, `"OrderPaid"`). They are accumulated by the aggregate and
//! published through the mediator after the aggregate has been persisted.
//!
//! Every event must expose a stable name and the moment it occurred. The name is
//! the routing key used when the event is published as a notification, so it is
//! part of the trait instead of being discovered at runtime.
//!
//! # Example
//!
//! ```
//! use composable_mediator_core::event::DomainEvent;
//! use chrono::{DateTime, Utc};
//!
//! #[derive(Clone, Debug)]
//! enum OrderEvent {
//!     Created { order_id: i64, at: DateTime<Utc> },
//!     Paid { order_id: i64, at: DateTime<Utc> },
//! }
//!
//! impl DomainEvent for OrderEvent {
//!     fn event_name(&self) -> &'static str {
//!         match self {
//!             OrderEvent::Created { .. } => "OrderCreated",
//!             OrderEvent::Paid { .. } => "OrderPaid",
//!         }
//!     }
//!
//!     fn occurred_at(&self) -> DateTime<Utc> {
//!         match self {
//!             OrderEvent::Created { at, .. } | OrderEvent::Paid { at, .. } => *at,
//!         }
//!     }
//! }
//!
//! let event = OrderEvent::Paid { order_id: 1, at: Utc::now() };
//! assert_eq!(event.event_name(), "OrderPaid");
//! ```

use chrono::{DateTime, Utc};

/// Something that happened inside an aggregate.
///
/// # Naming
///
/// `event_name()` is the notification name subscribers register under, so it
/// must be stable for the lifetime of the process. Enum events usually map each
/// variant to its own name.
///
/// # Thread Safety
///
/// Events are handed to subscribers that may run on other tasks, so they must be
/// `Send + Sync + 'static`.
pub trait DomainEvent: Send + Sync + 'static {
    /// Routing name of this event (e.g. `"OrderCreated"`)
    fn event_name(&self) -> &'static str;

    /// When the event occurred
    fn occurred_at(&self) -> DateTime<Utc>;
}
