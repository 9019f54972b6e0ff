//! Built-in pipeline behaviors.
//!
//! Register them with [`Mediator::add_pipeline_behavior`](crate::mediator::Mediator::add_pipeline_behavior).
//! A typical order, outermost first:
//!
//! 1. [`RecoveryBehavior`] so panics anywhere below become errors
//! 2. [`LoggingBehavior`]
//! 3. [`TimeoutBehavior`]
//! 4. [`ValidationBehavior`] so invalid requests never open a transaction
//! 5. [`UnitOfWorkBehavior`]

pub mod logging;
pub mod recovery;
pub mod timeout;
pub mod unit_of_work;
pub mod validation;

pub use logging::LoggingBehavior;
pub use recovery::RecoveryBehavior;
pub use timeout::TimeoutBehavior;
pub use unit_of_work::{UnitOfWork, UnitOfWorkBehavior};
pub use validation::{Validate, ValidationBehavior};
