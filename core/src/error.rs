//! Error types shared by every part of the mediator.
//!
//! [`MediatorError`] is the single error type that travels through the pipeline.
//! Handlers and behaviors return it, the dispatcher returns it verbatim, and the
//! caller (typically an HTTP layer) decides how to map it to a user-visible outcome.
//!
//! # Taxonomy
//!
//! | Variant | Raised by | Meaning |
//! |---------|-----------|---------|
//! | `HandlerNotFound` | `send` | No handler bound to the request name |
//! | `InvalidRequest` | handlers | Payload is not the type the handler expects |
//! | `Validation` | validation behavior | Request rejected before the handler ran |
//! | `Handler` | handlers | Business failure, propagated unchanged |
//! | `Persistence` | repositories | Storage collaborator failed |
//! | `Panicked` | recovery behavior | A handler or inner behavior panicked |
//! | `Aggregate` | `publish` (run-all) | Several subscribers failed |

use crate::repository::RepositoryError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors produced while registering or dispatching requests and notifications.
#[derive(Error, Debug)]
pub enum MediatorError {
    /// No request handler is registered under the given name.
    #[error("no handler registered for request: {0}")]
    HandlerNotFound(String),

    /// A handler received a payload it cannot interpret.
    ///
    /// This is a wiring mistake (the wrong value was sent under a name), not a
    /// business validation failure.
    #[error("invalid request type for '{name}': expected {expected}, got {actual}")]
    InvalidRequest {
        /// Request or notification name
        name: String,
        /// Type the handler expected
        expected: &'static str,
        /// Type that was actually sent
        actual: &'static str,
    },

    /// A typed `send` could not downcast the handler's response.
    #[error("unexpected response type for '{name}': expected {expected}")]
    UnexpectedResponse {
        /// Request name
        name: String,
        /// Type the caller asked for
        expected: &'static str,
    },

    /// The request failed validation before reaching its handler.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// Business error returned by a handler.
    #[error(transparent)]
    Handler(#[from] anyhow::Error),

    /// The persistence collaborator failed.
    #[error("persistence failed: {0}")]
    Persistence(#[from] RepositoryError),

    /// Unit of work could not begin or commit.
    #[error("unit of work failed: {0}")]
    UnitOfWork(String),

    /// A handler or behavior panicked and the panic was converted by a recovery boundary.
    #[error("handler for '{name}' panicked: {message}")]
    Panicked {
        /// Request name
        name: String,
        /// Panic payload rendered as text
        message: String,
    },

    /// The request did not complete within its time budget.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The request context was cancelled.
    #[error("request cancelled")]
    Cancelled,

    /// A handler is already registered under this name and duplicates are rejected.
    #[error("handler already registered for: {0}")]
    DuplicateHandler(String),

    /// Handler names must not be empty.
    #[error("handler name must not be empty")]
    InvalidName,

    /// Several notification handlers failed during a run-all publish.
    #[error("{} notification handler(s) failed", .0.len())]
    Aggregate(Vec<MediatorError>),
}

impl MediatorError {
    /// Build a business error from a message.
    ///
    /// Shorthand for `MediatorError::Handler(anyhow::anyhow!(message))`.
    #[must_use]
    pub fn handler(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self::Handler(anyhow::Error::msg(message))
    }

    /// Returns `true` for [`MediatorError::HandlerNotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::HandlerNotFound(_))
    }

    /// Returns `true` for [`MediatorError::Validation`].
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns the validation errors if this is a validation failure.
    #[must_use]
    pub const fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

/// A single rule violation on one field of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    /// Field that failed (e.g. `"name"`)
    pub field: String,
    /// Human-readable reason
    pub message: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Collection of validation failures for one request.
///
/// Serializable so an HTTP layer can render the violations as-is.
///
/// # Example
///
/// ```
/// use composable_mediator_core::error::ValidationErrors;
///
/// let mut errors = ValidationErrors::new();
/// errors.add("name", "must not be empty");
/// errors.add("count", "must be greater than 0");
///
/// assert_eq!(errors.len(), 2);
/// assert_eq!(errors.to_string(), "name: must not be empty; count: must be greater than 0");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    violations: Vec<FieldViolation>,
}

impl ValidationErrors {
    /// Create an empty set of violations
    #[must_use]
    pub const fn new() -> Self {
        Self {
            violations: Vec::new(),
        }
    }

    /// Create a set holding a single violation
    #[must_use]
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    /// Record a violation
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.violations.push(FieldViolation {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Append every violation from `other`
    pub fn merge(&mut self, other: Self) {
        self.violations.extend(other.violations);
    }

    /// Violations in the order they were recorded
    #[must_use]
    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    /// Number of violations
    #[must_use]
    pub fn len(&self) -> usize {
        self.violations.len()
    }

    /// `true` when no rule was violated
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// `Ok(())` when empty, otherwise `Err(MediatorError::Validation)`.
    ///
    /// # Errors
    ///
    /// Returns [`MediatorError::Validation`] carrying `self` if any violation was recorded.
    pub fn into_result(self) -> Result<(), MediatorError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(MediatorError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, violation) in self.violations.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}
