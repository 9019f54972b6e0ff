//! End-to-end tests for the order module running on the mediator.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use composable_mediator_core::context::Context;
use composable_mediator_core::error::MediatorError;
use composable_mediator_runtime::MediatorConfig;
use composable_mediator_testing::{CallCounter, eventually, init_test_tracing, test_clock};
use order_processing::types::names;
use order_processing::{OrderApp, OrderEnvironment, OrderEvent, OrderId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

fn app() -> OrderApp {
    init_test_tracing();
    OrderApp::new(
        MediatorConfig::default(),
        OrderEnvironment::new(Arc::new(test_clock())).with_first_order_id(123),
    )
    .unwrap()
}

#[tokio::test]
async fn create_order_returns_id_and_notifies_every_subscriber() {
    let app = app();
    let first = CallCounter::new();
    let second = CallCounter::new();
    for counter in [first.clone(), second.clone()] {
        app.mediator()
            .register_notification(names::ORDER_CREATED, move |_ctx, _event: Arc<OrderEvent>| {
                counter.increment();
                async { Ok(()) }
            })
            .unwrap();
    }

    let order_id = app
        .create_order(Context::background(), "widget", 2)
        .await
        .unwrap();

    assert_eq!(order_id, OrderId::new(123));
    assert_eq!(first.count(), 1);
    assert_eq!(second.count(), 1);
    assert_eq!(app.deliveries().len(), 1);
}

#[tokio::test]
async fn subscribers_observe_the_persisted_order() {
    let app = app();
    let seen_persisted = Arc::new(AtomicBool::new(false));
    let orders = app.orders().clone();
    let flag = Arc::clone(&seen_persisted);
    app.mediator()
        .register_notification(names::ORDER_CREATED, move |_ctx, event: Arc<OrderEvent>| {
            flag.store(orders.contains(&event.order_id()), Ordering::SeqCst);
            async { Ok(()) }
        })
        .unwrap();

    let order_id = app
        .create_order(Context::background(), "widget", 1)
        .await
        .unwrap();

    assert!(seen_persisted.load(Ordering::SeqCst));
    let stored = app.orders().snapshot(&order_id).unwrap();
    assert_eq!(stored.name(), "widget");
}

#[tokio::test]
async fn invalid_order_is_rejected_before_the_handler() {
    let app = app();

    let error = app
        .create_order(Context::background(), "", 0)
        .await
        .unwrap_err();

    let violations = error.validation_errors().expect("validation error");
    assert_eq!(violations.len(), 2);
    assert!(app.orders().is_empty());
    assert!(app.deliveries().is_empty());

    // No id was consumed by the rejected request
    let order_id = app
        .create_order(Context::background(), "widget", 1)
        .await
        .unwrap();
    assert_eq!(order_id, OrderId::new(123));
}

#[tokio::test]
async fn paying_sends_one_confirmation_and_rejects_second_payment() {
    let app = app();
    let ctx = Context::background();
    let order_id = app.create_order(ctx.clone(), "widget", 2).await.unwrap();

    app.pay_order(ctx.clone(), order_id).await.unwrap();
    let error = app.pay_order(ctx.clone(), order_id).await.unwrap_err();
    assert!(matches!(error, MediatorError::Handler(_)));
    assert!(error.to_string().contains("already paid"));

    let view = app.get_order(ctx, order_id).await.unwrap();
    assert!(view.paid);

    assert!(eventually(Duration::from_secs(1), || app.outbox().sent().len() == 1).await);
    app.shutdown().await.unwrap();
    assert_eq!(app.outbox().sent()[0].order_id, order_id);
}

#[tokio::test]
async fn unknown_order_is_reported() {
    let app = app();

    let error = app
        .get_order(Context::background(), OrderId::new(404))
        .await
        .unwrap_err();

    assert!(error.to_string().contains("order 404 not found"));
}

#[tokio::test]
async fn storage_failure_publishes_nothing() {
    let app = app();
    let notified = CallCounter::new();
    let counter = notified.clone();
    app.mediator()
        .register_notification(names::ORDER_CREATED, move |_ctx, _event: Arc<OrderEvent>| {
            counter.increment();
            async { Ok(()) }
        })
        .unwrap();
    app.orders().set_failing(true);

    let error = app
        .create_order(Context::background(), "widget", 1)
        .await
        .unwrap_err();

    assert!(matches!(error, MediatorError::Persistence(_)));
    assert_eq!(notified.count(), 0);
    assert!(app.deliveries().is_empty());
}
