//! Order Processing demo binary
//!
//! Creates and pays an order through the mediator, then drains async subscribers.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=debug MEDIATOR_PUBLISH_STRATEGY=run_all cargo run --bin order-processing
//! ```

use anyhow::Context as _;
use composable_mediator_core::context::Context;
use composable_mediator_core::environment::SystemClock;
use composable_mediator_runtime::MediatorConfig;
use order_processing::{OrderApp, OrderEnvironment};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "order_processing=info,composable_mediator_runtime=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== Order Processing: Composable Mediator ===\n");

    let config = MediatorConfig::from_env().context("invalid mediator configuration")?;
    let app = OrderApp::new(config, OrderEnvironment::new(Arc::new(SystemClock)))?;

    let ctx = Context::background().with_correlation_id("demo-1");

    println!(">>> Sending: CreateOrder {{ name: \"widget\", count: 2 }}");
    let order_id = app.create_order(ctx.clone(), "widget", 2).await?;
    println!("Created order {order_id}");
    println!("Delivery records: {}", app.deliveries().len());

    println!("\n>>> Sending: CreateOrder {{ name: \"\", count: 0 }}");
    if let Err(error) = app.create_order(ctx.clone(), "", 0).await {
        println!("Rejected: {error}");
    }

    println!("\n>>> Sending: PayOrder {{ order_id: {order_id} }}");
    app.pay_order(ctx.clone(), order_id).await?;

    println!("\n>>> Sending: PayOrder {{ order_id: {order_id} }} (again)");
    if let Err(error) = app.pay_order(ctx.clone(), order_id).await {
        println!("Rejected: {error}");
    }

    let view = app.get_order(ctx, order_id).await?;
    println!("\nOrder {}: {} x{} paid={}", view.id, view.name, view.count, view.paid);

    app.shutdown().await?;
    println!("Payment confirmations sent: {}", app.outbox().sent().len());

    println!("\n=== Demonstration Complete ===");
    Ok(())
}
