//! Request and response envelopes.
//!
//! A [`Request`] pairs a symbolic name (`"CreateOrder"`, `"GetOrder"`) with a
//! type-erased payload. The name selects the handler; the payload is recovered by
//! the handler with [`Request::downcast_ref`] or [`Request::downcast_arc`]. There
//! is no reflection: a handler either gets the concrete type it asked for or a
//! [`MediatorError::InvalidRequest`].
//!
//! Commands and queries share this envelope. The distinction is a naming
//! convention, not a storage one.
//!
//! # Example
//!
//! ```
//! use composable_mediator_core::request::Request;
//!
//! struct CreateOrder {
//!     name: String,
//!     count: u32,
//! }
//!
//! let request = Request::new("CreateOrder", CreateOrder { name: "widget".into(), count: 2 });
//!
//! assert_eq!(request.name(), "CreateOrder");
//! let command = request.downcast_ref::<CreateOrder>().unwrap();
//! assert_eq!(command.count, 2);
//! assert!(request.downcast_ref::<String>().is_none());
//! ```

use crate::error::MediatorError;
use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

/// Shared, type-erased payload of a request or notification.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Type-erased handler output.
///
/// Commands without a meaningful result respond with `()`.
pub type Response = Box<dyn Any + Send>;

/// A named request travelling through the pipeline.
///
/// Cloning is cheap: the name and payload are reference counted, so behaviors can
/// hold on to the request while forwarding it down the chain.
#[derive(Clone)]
pub struct Request {
    name: Arc<str>,
    payload: Payload,
    type_name: &'static str,
}

impl Request {
    /// Wrap a concrete payload under `name`.
    pub fn new<T>(name: impl Into<Arc<str>>, payload: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            name: name.into(),
            payload: Arc::new(payload),
            type_name: type_name::<T>(),
        }
    }

    /// Wrap an already shared payload.
    ///
    /// The concrete type name is unknown at this point, so diagnostics report
    /// `"dyn Any"` for it.
    pub fn from_payload(name: impl Into<Arc<str>>, payload: Payload) -> Self {
        Self {
            name: name.into(),
            payload,
            type_name: "dyn Any",
        }
    }

    /// Request name used for handler lookup
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
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

    /// Whether the payload is a `T`
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.payload.is::<T>()
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
            .ok_or_else(|| self.invalid::<T>())
    }

    /// Take shared ownership of the payload as `Arc<T>`.
    ///
    /// Useful inside `async move` handler bodies that must own their input.
    ///
    /// # Errors
    ///
    /// Returns [`MediatorError::InvalidRequest`] when the payload has another type.
    pub fn downcast_arc<T>(&self) -> Result<Arc<T>, MediatorError>
    where
        T: Any + Send + Sync,
    {
        Arc::clone(&self.payload)
            .downcast::<T>()
            .map_err(|_| self.invalid::<T>())
    }

    fn invalid<T>(&self) -> MediatorError {
        MediatorError::InvalidRequest {
            name: self.name.to_string(),
            expected: type_name::<T>(),
            actual: self.type_name,
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("name", &self.name)
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Box a value as a [`Response`].
#[must_use]
pub fn respond<T: Any + Send>(value: T) -> Response {
    Box::new(value)
}

/// Recover a typed value from a [`Response`].
///
/// # Errors
///
/// Returns [`MediatorError::UnexpectedResponse`] when the response holds another type.
pub fn downcast_response<R: Any>(name: &str, response: Response) -> Result<R, MediatorError> {
    response
        .downcast::<R>()
        .map(|boxed| *boxed)
        .map_err(|_| MediatorError::UnexpectedResponse {
            name: name.to_string(),
            expected: type_name::<R>(),
        })
}
