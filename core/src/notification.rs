//! Notification envelope.
//!
//! A [`Notification`] is what subscribers receive when something is published.
//! Like [`Request`](crate::request::Request) it pairs a routing name with a
//! type-erased payload, and additionally records when the notification was
//! created and which request (correlation id) caused it.
//!
//! Unlike requests, a notification name may have zero, one or many handlers.

use crate::error::MediatorError;
use crate::event::DomainEvent;
use crate::request::Payload;
use chrono::{DateTime, Utc};
use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

/// A named, timestamped value delivered to notification handlers.
#[derive(Clone)]
pub struct Notification {
    name: Arc<str>,
    payload: Payload,
    type_name: &'static str,
    occurred_at: DateTime<Utc>,
    correlation_id: Option<Arc<str>>,
}

impl Notification {
    /// Wrap a payload under `name`, stamped with the current time.
    pub fn new<T>(name: impl Into<Arc<str>>, payload: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            name: name.into(),
            payload: Arc::new(payload),
            type_name: type_name::<T>(),
            occurred_at: Utc::now(),
            correlation_id: None,
        }
    }

    /// Build a notification from a domain event.
    ///
    /// The routing name and timestamp are taken from the event itself.
    ///
    /// # Example
    ///
    /// ```
    /// use composable_mediator_core::event::DomainEvent;
    /// use composable_mediator_core::notification::Notification;
    /// use chrono::{DateTime, Utc};
    ///
    /// struct OrderPaid { at: DateTime<Utc> }
    ///
    /// impl DomainEvent for OrderPaid {
    ///     fn event_name(&self) -> &'static str { "OrderPaid" }
    ///     fn occurred_at(&self) -> DateTime<Utc> { self.at }
    /// }
    ///
    /// let at = Utc::now();
    /// let notification = Notification::from_event(OrderPaid { at });
    /// assert_eq!(notification.name(), "OrderPaid");
    /// assert_eq!(notification.occurred_at(), at);
    /// ```
    pub fn from_event<E: DomainEvent>(event: E) -> Self {
        let name = event.event_name();
        let occurred_at = event.occurred_at();
        Self {
            name: Arc::from(name),
            payload: Arc::new(event),
            type_name: type_name::<E>(),
            occurred_at,
            correlation_id: None,
        }
    }

    /// Override the creation timestamp.
    #[must_use]
    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    /// Attach a correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<Arc<str>>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Attach a correlation id unless one is already present.
    #[must_use]
    pub fn or_correlation_id(mut self, id: Option<Arc<str>>) -> Self {
        if self.correlation_id.is_none() {
            self.correlation_id = id;
        }
        self
    }

    /// Notification name used for subscriber lookup
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// When the notification was created
    #[must_use]
    pub const fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// Correlation id, if any
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Type name of the payload, for diagnostics
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The shared payload
    #[must_use]
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Borrow the payload as `T`, if it is one.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Borrow the payload as `T` or fail with [`MediatorError::InvalidRequest`].
    ///
    /// # Errors
    ///
    /// Returns [`MediatorError::InvalidRequest`] when the payload has another type.
    pub fn payload_as<T: Any>(&self) -> Result<&T, MediatorError> {
        self.payload
            .downcast_ref::<T>()
            .ok_or_else(|| MediatorError::InvalidRequest {
                name: self.name.to_string(),
                expected: type_name::<T>(),
                actual: self.type_name,
            })
    }
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notification")
            .field("name", &self.name)
            .field("type", &self.type_name)
            .field("occurred_at", &self.occurred_at)
            .field("correlation_id", &self.correlation_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;

    #[derive(Debug)]
    struct WelcomeEmail {
        address: String,
    }

    #[test]
    fn new_notification_is_timestamped() {
        let before = Utc::now();
        let notification = Notification::new(
            "EmployeeJoined",
            WelcomeEmail {
                address: "a@b.c".into(),
            },
        );
        assert!(notification.occurred_at() >= before);
        assert_eq!(notification.name(), "EmployeeJoined");
        assert_eq!(
            notification.payload_as::<WelcomeEmail>().unwrap().address,
            "a@b.c"
        );
    }

    #[test]
    fn payload_mismatch_is_invalid_request() {
        let notification = Notification::new("OrderCreated", 1_u8);
        let error = notification.payload_as::<WelcomeEmail>().unwrap_err();
        assert!(matches!(error, MediatorError::InvalidRequest { .. }));
    }

    #[test]
    fn correlation_id_is_not_overwritten() {
        let notification = Notification::new("OrderCreated", ())
            .with_correlation_id("first")
            .or_correlation_id(Some(Arc::from("second")));
        assert_eq!(notification.correlation_id(), Some("first"));

        let notification =
            Notification::new("OrderCreated", ()).or_correlation_id(Some(Arc::from("second")));
        assert_eq!(notification.correlation_id(), Some("second"));
    }
}
