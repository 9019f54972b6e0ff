//! Request validation.
//!
//! [`ValidationBehavior`] holds validation rules keyed by payload type. Before
//! the handler runs, every rule matching the request's payload type is
//! evaluated and all field violations are collected. If any were found the
//! chain stops with [`MediatorError::Validation`] and the handler never runs.
//!
//! # Example
//!
//! ```
//! use composable_mediator_runtime::behaviors::validation::{Validate, ValidationBehavior};
//! use composable_mediator_core::error::ValidationErrors;
//!
//! struct CreateOrder { name: String, count: u32 }
//!
//! impl Validate for CreateOrder {
//!     fn validate(&self, errors: &mut ValidationErrors) {
//!         if self.name.is_empty() {
//!             errors.add("name", "is required");
//!         }
//!         if self.count == 0 {
//!             errors.add("count", "must be at least 1");
//!         }
//!     }
//! }
//!
//! let validation = ValidationBehavior::new().validate::<CreateOrder>();
//! assert_eq!(validation.rule_count(), 1);
//! ```

use composable_mediator_core::behavior::{Next, PipelineBehavior};
use composable_mediator_core::context::Context;
use composable_mediator_core::error::{MediatorError, ValidationErrors};
use composable_mediator_core::handler::HandlerResult;
use composable_mediator_core::request::Request;
use futures::future::BoxFuture;
use std::any::Any;
use std::sync::Arc;

/// Self-validating request payload.
pub trait Validate: Any + Send + Sync {
    /// Record every violation in `errors`.
    fn validate(&self, errors: &mut ValidationErrors);
}

type Rule = Arc<dyn Fn(&Request, &mut ValidationErrors) + Send + Sync>;

/// Rejects requests whose payload breaks a registered rule.
///
/// Payload types without a rule pass through unchecked.
#[derive(Clone, Default)]
pub struct ValidationBehavior {
    rules: Vec<Rule>,
}

impl ValidationBehavior {
    /// Behavior with no rules
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule for payloads of type `T`.
    #[must_use]
    pub fn rule<T, F>(mut self, rule: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T, &mut ValidationErrors) + Send + Sync + 'static,
    {
        self.rules.push(Arc::new(move |request: &Request, errors: &mut ValidationErrors| {
            if let Some(payload) = request.downcast_ref::<T>() {
                rule(payload, errors);
            }
        }));
        self
    }

    /// Validate payloads of type `T` with its [`Validate`] implementation.
    #[must_use]
    pub fn validate<T: Validate>(self) -> Self {
        self.rule::<T, _>(T::validate)
    }

    /// Number of rules registered
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Run every rule against `request`.
    ///
    /// # Errors
    ///
    /// [`MediatorError::Validation`] with all collected violations.
    pub fn check(&self, request: &Request) -> Result<(), MediatorError> {
        let mut errors = ValidationErrors::new();
        for rule in &self.rules {
            rule(request, &mut errors);
        }
        errors.into_result()
    }
}

impl PipelineBehavior for ValidationBehavior {
    fn handle(&self, ctx: Context, request: Request, next: Next) -> BoxFuture<'_, HandlerResult> {
        if let Err(error) = self.check(&request) {
            tracing::debug!(
                request = %request.name(),
                error = %error,
                "Request rejected by validation"
            );
            metrics::counter!(
                "mediator.validation.rejected",
                "request" => request.name().to_string()
            )
            .increment(1);
            return Box::pin(futures::future::ready(Err(error)));
        }
        next.run(ctx)
    }

    fn name(&self) -> &'static str {
        "validation"
    }
}

impl std::fmt::Debug for ValidationBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationBehavior")
            .field("rules", &self.rules.len())
            .finish()
    }
}
