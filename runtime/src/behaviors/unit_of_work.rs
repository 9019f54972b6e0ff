//! Transactional boundary around a request.
//!
//! [`UnitOfWorkBehavior`] begins a unit of work before the handler runs,
//! commits it when the handler succeeds, and rolls it back when the handler
//! fails or the commit itself fails.
//!
//! ```text
//! begin ── err ──────────────────────────────→ Err(UnitOfWork)
//!   │
//!   ▼
//! next ── err ──→ rollback ──────────────────→ Err(handler error)
//!   │
//!   ▼
//! commit ── err ─→ rollback ─────────────────→ Err(UnitOfWork)
//!   │
//!   ▼
//! Ok(response)
//! ```

use composable_mediator_core::behavior::{Next, PipelineBehavior};
use composable_mediator_core::context::Context;
use composable_mediator_core::error::MediatorError;
use composable_mediator_core::handler::HandlerResult;
use composable_mediator_core::request::Request;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Transaction collaborator driven by [`UnitOfWorkBehavior`].
pub trait UnitOfWork: Send + Sync {
    /// Start a unit of work.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be opened.
    fn begin<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, anyhow::Result<()>>;

    /// Make the work durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails; the behavior then rolls back.
    fn commit<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, anyhow::Result<()>>;

    /// Discard the work.
    ///
    /// # Errors
    ///
    /// Rollback errors are logged by the behavior; the original error is the
    /// one returned to the caller.
    fn rollback<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, anyhow::Result<()>>;
}

impl<U: UnitOfWork + ?Sized> UnitOfWork for Arc<U> {
    fn begin<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, anyhow::Result<()>> {
        (**self).begin(ctx)
    }

    fn commit<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, anyhow::Result<()>> {
        (**self).commit(ctx)
    }

    fn rollback<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, anyhow::Result<()>> {
        (**self).rollback(ctx)
    }
}

/// Wraps each request in a unit of work.
pub struct UnitOfWorkBehavior<U> {
    unit_of_work: U,
}

impl<U: UnitOfWork> UnitOfWorkBehavior<U> {
    /// Create the behavior around a unit of work.
    pub const fn new(unit_of_work: U) -> Self {
        Self { unit_of_work }
    }

    async fn rollback(&self, ctx: &Context, request: &str) {
        if let Err(error) = self.unit_of_work.rollback(ctx).await {
            tracing::error!(request, error = %error, "Rollback failed");
        }
    }
}

impl<U: UnitOfWork> PipelineBehavior for UnitOfWorkBehavior<U> {
    fn handle(&self, ctx: Context, request: Request, next: Next) -> BoxFuture<'_, HandlerResult> {
        Box::pin(async move {
            let name = request.name();

            if let Err(error) = self.unit_of_work.begin(&ctx).await {
                tracing::warn!(request = name, error = %error, "Could not begin unit of work");
                return Err(MediatorError::UnitOfWork(format!("begin failed: {error}")));
            }

            let response = match next.run(ctx.clone()).await {
                Ok(response) => response,
                Err(error) => {
                    tracing::debug!(request = name, error = %error, "Rolling back unit of work");
                    self.rollback(&ctx, name).await;
                    return Err(error);
                }
            };

            if let Err(error) = self.unit_of_work.commit(&ctx).await {
                tracing::warn!(request = name, error = %error, "Commit failed, rolling back");
                self.rollback(&ctx, name).await;
                return Err(MediatorError::UnitOfWork(format!("commit failed: {error}")));
            }

            Ok(response)
        })
    }

    fn name(&self) -> &'static str {
        "unit_of_work"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use composable_mediator_core::request::Response;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Journal {
        steps: Mutex<Vec<&'static str>>,
        fail_commit: bool,
    }

    impl Journal {
        fn record(&self, step: &'static str) {
            self.steps.lock().unwrap().push(step);
        }
    }

    impl UnitOfWork for Journal {
        fn begin<'a>(&'a self, _ctx: &'a Context) -> BoxFuture<'a, anyhow::Result<()>> {
            Box::pin(async move {
                self.record("begin");
                Ok(())
            })
        }

        fn commit<'a>(&'a self, _ctx: &'a Context) -> BoxFuture<'a, anyhow::Result<()>> {
            Box::pin(async move {
                self.record("commit");
                if self.fail_commit {
                    anyhow::bail!("disk full");
                }
                Ok(())
            })
        }

        fn rollback<'a>(&'a self, _ctx: &'a Context) -> BoxFuture<'a, anyhow::Result<()>> {
            Box::pin(async move {
                self.record("rollback");
                Ok(())
            })
        }
    }

    fn ok_next() -> Next {
        Next::new(|_ctx| Box::pin(async { Ok(Box::new(()) as Response) }))
    }

    #[tokio::test]
    async fn commits_on_success() {
        let journal = Arc::new(Journal::default());
        UnitOfWorkBehavior::new(Arc::clone(&journal))
            .handle(Context::background(), Request::new("Save", ()), ok_next())
            .await
            .unwrap();

        assert_eq!(*journal.steps.lock().unwrap(), vec!["begin", "commit"]);
    }

    #[tokio::test]
    async fn rolls_back_on_handler_error() {
        let journal = Arc::new(Journal::default());
        let failing = Next::new(|_ctx| {
            Box::pin(async { Err(MediatorError::handler("order already paid")) })
        });

        let error = UnitOfWorkBehavior::new(Arc::clone(&journal))
            .handle(Context::background(), Request::new("Save", ()), failing)
            .await
            .unwrap_err();

        assert_eq!(error.to_string(), "order already paid");
        assert_eq!(*journal.steps.lock().unwrap(), vec!["begin", "rollback"]);
    }

    #[tokio::test]
    async fn rolls_back_on_commit_failure() {
        let journal = Arc::new(Journal {
            fail_commit: true,
            ..Journal::default()
        });

        let error = UnitOfWorkBehavior::new(Arc::clone(&journal))
            .handle(Context::background(), Request::new("Save", ()), ok_next())
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            MediatorError::UnitOfWork(ref message) if message.contains("disk full")
        ));
        assert_eq!(
            *journal.steps.lock().unwrap(),
            vec!["begin", "commit", "rollback"]
        );
    }
}
