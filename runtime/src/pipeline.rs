//! Pipeline composition.
//!
//! The chain is built from the inside out: the terminal handler becomes the
//! innermost continuation, then each behavior, from the last registered to the
//! first, wraps the continuation built so far. Invoking the result therefore
//! enters behaviors in registration order and leaves them in reverse.
//!
//! ```text
//! behaviors = [B1, B2]
//!
//! next₀ = |ctx| handler.handle(ctx, request)
//! next₁ = |ctx| B2.handle(ctx, request, next₀)
//! next₂ = |ctx| B1.handle(ctx, request, next₁)   ← returned
//! ```

use composable_mediator_core::behavior::{Next, PipelineBehavior};
use composable_mediator_core::handler::RequestHandler;
use composable_mediator_core::request::Request;
use std::sync::Arc;

/// Wrap `handler` in `behaviors` and return the outermost continuation.
///
/// Nothing runs until the returned [`Next`] is invoked. With no behaviors the
/// continuation calls the handler directly.
#[must_use]
pub fn compose(
    behaviors: &[Arc<dyn PipelineBehavior>],
    handler: Arc<dyn RequestHandler>,
    request: Request,
) -> Next {
    let terminal = {
        let request = request.clone();
        Next::new(move |ctx| Box::pin(async move { handler.handle(ctx, request).await }))
    };

    behaviors.iter().rev().fold(terminal, |next, behavior| {
        let behavior = Arc::clone(behavior);
        let request = request.clone();
        Next::new(move |ctx| Box::pin(async move { behavior.handle(ctx, request, next).await }))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use composable_mediator_core::behavior::behavior_fn;
    use composable_mediator_core::context::Context;
    use composable_mediator_core::error::MediatorError;
    use composable_mediator_core::handler::handler_fn;
    use composable_mediator_core::request::{Response, downcast_response};
    use proptest::prelude::*;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording(log: &Log, label: String) -> Arc<dyn PipelineBehavior> {
        let log = Arc::clone(log);
        Arc::new(behavior_fn("recording", move |ctx, _req, next: Next| {
            let log = Arc::clone(&log);
            let label = label.clone();
            async move {
                log.lock().unwrap().push(format!("{label}-Before"));
                let result = next.run(ctx).await;
                log.lock().unwrap().push(format!("{label}-After"));
                result
            }
        }))
    }

    fn recording_handler(log: &Log) -> Arc<dyn RequestHandler> {
        let log = Arc::clone(log);
        Arc::new(handler_fn(move |_ctx, _req| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push("Handler".to_string());
                Ok(Box::new("done") as Response)
            }
        }))
    }

    fn expected_trace(n: usize) -> Vec<String> {
        let mut trace: Vec<String> = (1..=n).map(|i| format!("B{i}-Before")).collect();
        trace.push("Handler".to_string());
        trace.extend((1..=n).rev().map(|i| format!("B{i}-After")));
        trace
    }

    #[tokio::test]
    async fn two_behaviors_nest_in_registration_order() {
        let log: Log = Arc::default();
        let behaviors = vec![recording(&log, "B1".into()), recording(&log, "B2".into())];

        compose(&behaviors, recording_handler(&log), Request::new("Test", ()))
            .run(Context::background())
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["B1-Before", "B2-Before", "Handler", "B2-After", "B1-After"]
        );
    }

    #[tokio::test]
    async fn no_behaviors_calls_handler_directly() {
        let log: Log = Arc::default();
        let response = compose(&[], recording_handler(&log), Request::new("Test", ()))
            .run(Context::background())
            .await
            .unwrap();

        assert_eq!(downcast_response::<&str>("Test", response).unwrap(), "done");
        assert_eq!(*log.lock().unwrap(), vec!["Handler"]);
    }

    #[tokio::test]
    async fn nothing_runs_until_invoked() {
        let log: Log = Arc::default();
        let next = compose(
            &[recording(&log, "B1".into())],
            recording_handler(&log),
            Request::new("Test", ()),
        );
        assert!(log.lock().unwrap().is_empty());
        drop(next);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn short_circuit_skips_inner_links() {
        let log: Log = Arc::default();
        let stop: Arc<dyn PipelineBehavior> =
            Arc::new(behavior_fn("stop", |_ctx, _req, _next| async {
                Err(MediatorError::handler("stopped"))
            }));
        let behaviors = vec![recording(&log, "B1".into()), stop, recording(&log, "B3".into())];

        let error = compose(&behaviors, recording_handler(&log), Request::new("Test", ()))
            .run(Context::background())
            .await
            .unwrap_err();

        assert_eq!(error.to_string(), "stopped");
        assert_eq!(*log.lock().unwrap(), vec!["B1-Before", "B1-After"]);
    }

    proptest! {
        #[test]
        fn n_behaviors_nest_symmetrically(n in 0usize..12) {
            let log: Log = Arc::default();
            let behaviors: Vec<_> = (1..=n).map(|i| recording(&log, format!("B{i}"))).collect();

            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let chain = compose(&behaviors, recording_handler(&log), Request::new("Test", ()));
            runtime.block_on(chain.run(Context::background())).unwrap();

            prop_assert_eq!(log.lock().unwrap().clone(), expected_trace(n));
        }
    }
}
