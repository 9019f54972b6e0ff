//! Request logging.

use composable_mediator_core::behavior::{Next, PipelineBehavior};
use composable_mediator_core::context::Context;
use composable_mediator_core::handler::HandlerResult;
use composable_mediator_core::request::Request;
use futures::future::BoxFuture;
use std::time::Instant;
use tracing::Instrument;

/// Wraps each request in a `request` span and logs its outcome and latency.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingBehavior;

impl PipelineBehavior for LoggingBehavior {
    fn handle(&self, ctx: Context, request: Request, next: Next) -> BoxFuture<'_, HandlerResult> {
        let span = tracing::info_span!(
            "request",
            request = %request.name(),
            payload = request.type_name(),
            correlation_id = ?ctx.correlation_id(),
        );

        Box::pin(
            async move {
                tracing::debug!("Handling request");
                let start = Instant::now();
                let result = next.run(ctx).await;
                let elapsed_ms = start.elapsed().as_millis();

                match &result {
                    Ok(_) => tracing::info!(elapsed_ms, "Request handled"),
                    Err(error) => tracing::warn!(elapsed_ms, error = %error, "Request failed"),
                }

                result
            }
            .instrument(span),
        )
    }

    fn name(&self) -> &'static str {
        "logging"
    }
}
