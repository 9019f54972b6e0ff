//! Panic recovery.
//!
//! The dispatcher does not catch panics. Register [`RecoveryBehavior`] first
//! (outermost) to turn a panic anywhere inside the chain into
//! [`MediatorError::Panicked`].

use composable_mediator_core::behavior::{Next, PipelineBehavior};
use composable_mediator_core::context::Context;
use composable_mediator_core::error::MediatorError;
use composable_mediator_core::handler::HandlerResult;
use composable_mediator_core::request::Request;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::any::Any;
use std::panic::AssertUnwindSafe;

/// Converts panics raised by inner behaviors or the handler into errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryBehavior;

impl PipelineBehavior for RecoveryBehavior {
    fn handle(&self, ctx: Context, request: Request, next: Next) -> BoxFuture<'_, HandlerResult> {
        Box::pin(async move {
            match AssertUnwindSafe(next.run(ctx)).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    metrics::counter!(
                        "mediator.handler_panics",
                        "request" => request.name().to_string()
                    )
                    .increment(1);
                    tracing::error!(
                        request = %request.name(),
                        panic = %message,
                        "Handler panicked"
                    );
                    Err(MediatorError::Panicked {
                        name: request.name().to_string(),
                        message,
                    })
                }
            }
        })
    }

    fn name(&self) -> &'static str {
        "recovery"
    }
}

/// Render a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
