//! Prometheus metrics for observability and monitoring.
//!
//! The mediator records through the `metrics` facade; nothing is exported until
//! a recorder is installed. [`MetricsServer`] installs the Prometheus recorder
//! and describes every metric the mediator emits:
//!
//! - Request dispatch (`send`)
//! - Notification fan-out (`publish`, `publish_async`)
//! - Built-in behaviors (validation, timeout, recovery)
//! - Publish after persist
//!
//! # Example
//!
//! ```rust,no_run
//! use composable_mediator_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Serve `server.render()` from the application's /metrics endpoint
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics recorder.
///
/// The address is where the embedding application serves [`render`](Self::render);
/// it is reported in logs only.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address metrics will be scraped from (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Describe the mediator metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., by another test), this logs a
    /// warning and succeeds without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics recorder installed - scrape http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!(
                        "Metrics recorder already initialized, skipping re-initialization"
                    );
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Request dispatch
    describe_counter!(
        "mediator.requests.total",
        "Requests dispatched, labelled by request name and outcome (success, error, not_found)"
    );
    describe_histogram!(
        "mediator.request.duration_seconds",
        "Time spent in the pipeline and handler per request"
    );
    describe_counter!(
        "mediator.handler_not_found",
        "Requests sent to a name without a registered handler"
    );

    // Notifications
    describe_counter!(
        "mediator.notifications.published",
        "Notifications published, synchronously or asynchronously"
    );
    describe_counter!(
        "mediator.notifications.failed",
        "Subscriber failures during synchronous publish"
    );
    describe_counter!(
        "mediator.notifications.async_failed",
        "Subscriber failures and panics during async publish"
    );

    // Behaviors
    describe_counter!(
        "mediator.validation.rejected",
        "Requests rejected by the validation behavior"
    );
    describe_counter!(
        "mediator.requests.timed_out",
        "Requests that exceeded their time budget"
    );
    describe_counter!(
        "mediator.handler_panics",
        "Handler panics converted by the recovery behavior"
    );

    // Publish after persist
    describe_counter!(
        "mediator.events.publish_failed",
        "Domain events whose publish failed after the aggregate was persisted"
    );
}
