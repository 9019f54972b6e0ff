//! Integration tests for request dispatch through the pipeline.
//!
//! Covers routing by name, behavior ordering, short-circuiting and the
//! built-in behaviors working together on one mediator.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use composable_mediator_core::context::Context;
use composable_mediator_core::error::{MediatorError, ValidationErrors};
use composable_mediator_core::request::Request;
use composable_mediator_runtime::behaviors::{
    LoggingBehavior, RecoveryBehavior, TimeoutBehavior, UnitOfWorkBehavior, Validate,
    ValidationBehavior,
};
use composable_mediator_runtime::{DuplicatePolicy, Mediator, MediatorConfig};
use composable_mediator_testing::{
    CallCounter, RecordingUnitOfWork, Trace, TracingBehavior, UowStep, init_test_tracing,
};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Debug)]
struct CreateOrder {
    name: String,
    count: u32,
}

impl Validate for CreateOrder {
    fn validate(&self, errors: &mut ValidationErrors) {
        if self.name.is_empty() {
            errors.add("name", "is required");
        }
        if self.count == 0 {
            errors.add("count", "must be at least 1");
        }
    }
}

fn widget() -> CreateOrder {
    CreateOrder {
        name: "widget".into(),
        count: 2,
    }
}

/// Mediator with `CreateOrder` bound to a handler that answers `123` and
/// records itself in `trace` and `calls`.
fn order_mediator(mediator: Mediator, trace: &Trace, calls: &CallCounter) -> Mediator {
    let (trace, calls) = (trace.clone(), calls.clone());
    mediator
        .register_command("CreateOrder", move |_ctx, _cmd: Arc<CreateOrder>| {
            trace.push("Handler");
            calls.increment();
            async { Ok(123_i64) }
        })
        .unwrap();
    mediator
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn unregistered_request_runs_nothing() {
    init_test_tracing();
    let trace = Trace::new();
    let calls = CallCounter::new();
    let mediator = order_mediator(Mediator::new(), &trace, &calls);
    mediator.add_pipeline_behavior(TracingBehavior::new("B1", trace.clone()));

    let error = mediator
        .send(Context::background(), Request::new("Unregistered", widget()))
        .await
        .unwrap_err();

    assert!(matches!(error, MediatorError::HandlerNotFound(ref name) if name == "Unregistered"));
    assert!(error.is_not_found());
    assert!(trace.entries().is_empty());
    assert_eq!(calls.count(), 0);
}

#[tokio::test]
async fn typed_send_returns_handler_value() {
    let mediator = order_mediator(Mediator::new(), &Trace::new(), &CallCounter::new());

    let id: i64 = mediator
        .send_typed(Context::background(), "CreateOrder", widget())
        .await
        .unwrap();

    assert_eq!(id, 123);
}

#[tokio::test]
async fn queries_and_commands_share_one_namespace() {
    let mediator = Mediator::with_config(
        MediatorConfig::default().with_duplicate_policy(DuplicatePolicy::Reject),
    );
    mediator
        .register_query("Lookup", |_ctx, _q: Arc<u32>| async { Ok("first") })
        .unwrap();

    let error = mediator
        .register_command("Lookup", |_ctx, _c: Arc<u32>| async { Ok("second") })
        .unwrap_err();
    assert!(matches!(error, MediatorError::DuplicateHandler(ref name) if name == "Lookup"));

    let answer: &str = mediator
        .send_typed(Context::background(), "Lookup", 1_u32)
        .await
        .unwrap();
    assert_eq!(answer, "first");
}

#[tokio::test]
async fn overwrite_policy_keeps_last_handler() {
    let mediator = Mediator::new();
    mediator
        .register_query("Lookup", |_ctx, _q: Arc<u32>| async { Ok("first") })
        .unwrap();
    mediator
        .register_query("Lookup", |_ctx, _q: Arc<u32>| async { Ok("second") })
        .unwrap();

    let answer: &str = mediator
        .send_typed(Context::background(), "Lookup", 1_u32)
        .await
        .unwrap();
    assert_eq!(answer, "second");
}

#[tokio::test]
async fn handler_can_send_nested_requests() {
    let mediator = Arc::new(Mediator::new());
    mediator
        .register_query("Price", |_ctx, count: Arc<u32>| async move { Ok(*count * 10) })
        .unwrap();

    let inner = Arc::downgrade(&mediator);
    mediator
        .register_command("Quote", move |ctx, cmd: Arc<CreateOrder>| {
            let inner = inner.clone();
            async move {
                let mediator = inner.upgrade().expect("mediator alive");
                let price: u32 = mediator.send_typed(ctx, "Price", cmd.count).await?;
                Ok::<_, MediatorError>(format!("{}: {price}", cmd.name))
            }
        })
        .unwrap();

    let quote: String = mediator
        .send_typed(Context::background(), "Quote", widget())
        .await
        .unwrap();
    assert_eq!(quote, "widget: 20");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn registration_is_safe_during_concurrent_dispatch() {
    let calls = CallCounter::new();
    let mediator = Arc::new(order_mediator(Mediator::new(), &Trace::new(), &calls));

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..200_u32 {
        let mediator = Arc::clone(&mediator);
        tasks.spawn(async move {
            if i % 10 == 0 {
                let index = i / 10;
                mediator
                    .register_query(&format!("Lookup{index}"), move |_ctx, _q: Arc<()>| async move {
                        Ok(index)
                    })
                    .unwrap();
            }
            mediator
                .send_typed::<_, i64>(Context::background(), "CreateOrder", widget())
                .await
                .unwrap()
        });
    }

    while let Some(joined) = tasks.join_next().await {
        assert_eq!(joined.unwrap(), 123);
    }
    assert_eq!(calls.count(), 200);

    for index in 0..20_u32 {
        let answer: u32 = mediator
            .send_typed(Context::background(), &format!("Lookup{index}"), ())
            .await
            .unwrap();
        assert_eq!(answer, index);
    }
}

// ============================================================================
// Pipeline behaviors
// ============================================================================

#[tokio::test]
async fn behaviors_wrap_handler_in_registration_order() {
    let trace = Trace::new();
    let calls = CallCounter::new();
    let mediator = order_mediator(Mediator::new(), &trace, &calls);
    mediator
        .add_pipeline_behavior(TracingBehavior::new("B1", trace.clone()))
        .add_pipeline_behavior(TracingBehavior::new("B2", trace.clone()));

    mediator
        .send(Context::background(), Request::new("CreateOrder", widget()))
        .await
        .unwrap();

    assert_eq!(
        trace.entries(),
        vec!["B1-Before", "B2-Before", "Handler", "B2-After", "B1-After"]
    );
    assert_eq!(calls.count(), 1);
}

#[tokio::test]
async fn validation_short_circuits_before_handler() {
    let trace = Trace::new();
    let calls = CallCounter::new();
    let mediator = order_mediator(Mediator::new(), &trace, &calls);
    mediator
        .add_pipeline_behavior(TracingBehavior::new("Outer", trace.clone()))
        .add_pipeline_behavior(ValidationBehavior::new().validate::<CreateOrder>());

    let error = mediator
        .send(
            Context::background(),
            Request::new(
                "CreateOrder",
                CreateOrder {
                    name: String::new(),
                    count: 0,
                },
            ),
        )
        .await
        .unwrap_err();

    let violations = error.validation_errors().expect("validation error");
    assert_eq!(violations.len(), 2);
    assert_eq!(calls.count(), 0);
    // Outer behavior still observed the rejection on the way out
    assert_eq!(trace.entries(), vec!["Outer-Before", "Outer-After"]);
}

#[tokio::test]
async fn recovery_turns_handler_panic_into_error() {
    let mediator = Mediator::new();
    mediator.add_pipeline_behavior(RecoveryBehavior);
    mediator
        .register_command("Explode", |_ctx, fuse: Arc<u32>| async move {
            if *fuse > 0 {
                panic!("boom after {fuse}");
            }
            Ok(())
        })
        .unwrap();

    let error = mediator
        .send(Context::background(), Request::new("Explode", 3_u32))
        .await
        .unwrap_err();

    match error {
        MediatorError::Panicked { name, message } => {
            assert_eq!(name, "Explode");
            assert!(message.contains("boom"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn timeout_behavior_bounds_slow_handlers() {
    let mediator = Mediator::new();
    mediator
        .add_pipeline_behavior(LoggingBehavior)
        .add_pipeline_behavior(TimeoutBehavior::new(Duration::from_millis(20)));
    mediator
        .register_command("Slow", |_ctx, _cmd: Arc<()>| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .unwrap();

    let error = mediator
        .send(Context::background(), Request::new("Slow", ()))
        .await
        .unwrap_err();

    assert!(matches!(error, MediatorError::Timeout(_)));
}

#[tokio::test]
async fn cancelled_context_stops_the_request() {
    let mediator = Mediator::new();
    mediator.add_pipeline_behavior(TimeoutBehavior::context_only());
    mediator
        .register_command("Slow", |_ctx, _cmd: Arc<()>| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .unwrap();

    let (ctx, handle) = Context::cancellable();
    handle.cancel();

    let error = mediator
        .send(ctx, Request::new("Slow", ()))
        .await
        .unwrap_err();

    assert!(matches!(error, MediatorError::Cancelled));
}

#[tokio::test]
async fn unit_of_work_commits_on_success_and_rolls_back_on_error() {
    let uow = RecordingUnitOfWork::new();
    let mediator = Mediator::new();
    mediator.add_pipeline_behavior(UnitOfWorkBehavior::new(uow.clone()));
    mediator
        .register_command("Ok", |_ctx, _cmd: Arc<()>| async { Ok(()) })
        .unwrap();
    mediator
        .register_command("Fail", |_ctx, _cmd: Arc<()>| async {
            Err::<(), _>(MediatorError::handler("insufficient stock"))
        })
        .unwrap();

    mediator
        .send(Context::background(), Request::new("Ok", ()))
        .await
        .unwrap();
    assert_eq!(uow.steps(), vec![UowStep::Begin, UowStep::Commit]);

    let error = mediator
        .send(Context::background(), Request::new("Fail", ()))
        .await
        .unwrap_err();
    assert_eq!(error.to_string(), "insufficient stock");
    assert_eq!(
        uow.steps(),
        vec![
            UowStep::Begin,
            UowStep::Commit,
            UowStep::Begin,
            UowStep::Rollback
        ]
    );
}

#[tokio::test]
async fn failed_commit_is_reported_after_rollback() {
    let uow = RecordingUnitOfWork::new().failing_commit();
    let calls = CallCounter::new();
    let mediator = order_mediator(Mediator::new(), &Trace::new(), &calls);
    mediator.add_pipeline_behavior(UnitOfWorkBehavior::new(uow.clone()));

    let error = mediator
        .send(Context::background(), Request::new("CreateOrder", widget()))
        .await
        .unwrap_err();

    assert!(matches!(error, MediatorError::UnitOfWork(_)));
    assert_eq!(calls.count(), 1);
    assert_eq!(
        uow.steps(),
        vec![UowStep::Begin, UowStep::Commit, UowStep::Rollback]
    );
}
