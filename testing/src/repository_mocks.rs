//! In-memory persistence doubles.
//!
//! - [`InMemoryRepository`]: a [`Repository`] over a `HashMap`, with failure injection
//! - [`RecordingUnitOfWork`]: a [`UnitOfWork`] that records every call

use composable_mediator_core::aggregate::AggregateRoot;
use composable_mediator_core::context::Context;
use composable_mediator_core::repository::{Repository, RepositoryError};
use composable_mediator_runtime::behaviors::UnitOfWork;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// In-memory repository for testing.
///
/// Stored copies never carry pending domain events, like a real repository
/// that reloads aggregates from storage. Clones share the same storage.
///
/// # Example
///
/// ```ignore
/// let repository = InMemoryRepository::<Order>::new();
/// repository.add(&ctx, &order).await?;
/// assert!(repository.contains(&order.id()));
/// ```
pub struct InMemoryRepository<A: AggregateRoot> {
    items: Arc<RwLock<HashMap<A::Id, A>>>,
    failing: Arc<AtomicBool>,
}

impl<A> InMemoryRepository<A>
where
    A: AggregateRoot + Clone,
    A::Id: Eq + Hash,
{
    /// Create an empty repository
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Arc::new(RwLock::new(HashMap::new())),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every subsequent call fail with [`RepositoryError::Backend`]
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Whether an aggregate with `id` is stored
    #[must_use]
    pub fn contains(&self, id: &A::Id) -> bool {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Copy of the stored aggregate, bypassing failure injection
    #[must_use]
    pub fn snapshot(&self, id: &A::Id) -> Option<A> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Number of stored aggregates
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove everything
    pub fn clear(&self) {
        self.items.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn check_failure(&self) -> Result<(), RepositoryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepositoryError::Backend(anyhow::anyhow!(
                "in-memory repository set to fail"
            )));
        }
        Ok(())
    }

    fn stored(aggregate: &A) -> A {
        let mut copy = aggregate.clone();
        copy.clear_domain_events();
        copy
    }
}

impl<A> Default for InMemoryRepository<A>
where
    A: AggregateRoot + Clone,
    A::Id: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<A: AggregateRoot> std::fmt::Debug for InMemoryRepository<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRepository")
            .field(
                "len",
                &self.items.read().unwrap_or_else(PoisonError::into_inner).len(),
            )
            .field("failing", &self.failing.load(Ordering::SeqCst))
            .finish()
    }
}

impl<A: AggregateRoot> Clone for InMemoryRepository<A> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
            failing: Arc::clone(&self.failing),
        }
    }
}

impl<A> Repository<A> for InMemoryRepository<A>
where
    A: AggregateRoot + Clone,
    A::Id: Eq + Hash,
{
    fn add<'a>(
        &'a self,
        _ctx: &'a Context,
        aggregate: &'a A,
    ) -> BoxFuture<'a, Result<(), RepositoryError>> {
        Box::pin(async move {
            self.check_failure()?;
            let id = aggregate.id();
            let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
            if items.contains_key(&id) {
                return Err(RepositoryError::AlreadyExists(format!("{id:?}")));
            }
            items.insert(id, Self::stored(aggregate));
            Ok(())
        })
    }

    fn update<'a>(
        &'a self,
        _ctx: &'a Context,
        aggregate: &'a A,
    ) -> BoxFuture<'a, Result<(), RepositoryError>> {
        Box::pin(async move {
            self.check_failure()?;
            let id = aggregate.id();
            let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
            let Some(slot) = items.get_mut(&id) else {
                return Err(RepositoryError::NotFound(format!("{id:?}")));
            };
            *slot = Self::stored(aggregate);
            Ok(())
        })
    }

    fn get<'a>(
        &'a self,
        _ctx: &'a Context,
        id: &'a A::Id,
    ) -> BoxFuture<'a, Result<Option<A>, RepositoryError>> {
        Box::pin(async move {
            self.check_failure()?;
            Ok(self.snapshot(id))
        })
    }
}

/// A call observed by [`RecordingUnitOfWork`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UowStep {
    /// `begin` was called
    Begin,
    /// `commit` was called
    Commit,
    /// `rollback` was called
    Rollback,
}

/// Unit of work that records calls and can be told to fail.
#[derive(Debug, Clone, Default)]
pub struct RecordingUnitOfWork {
    steps: Arc<Mutex<Vec<UowStep>>>,
    fail_begin: bool,
    fail_commit: bool,
}

impl RecordingUnitOfWork {
    /// Unit of work that always succeeds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `begin` fail
    #[must_use]
    pub const fn failing_begin(mut self) -> Self {
        self.fail_begin = true;
        self
    }

    /// Make `commit` fail
    #[must_use]
    pub const fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    /// Calls observed so far, in order
    #[must_use]
    pub fn steps(&self) -> Vec<UowStep> {
        self.steps.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn record(&self, step: UowStep) {
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(step);
    }
}

impl UnitOfWork for RecordingUnitOfWork {
    fn begin<'a>(&'a self, _ctx: &'a Context) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.record(UowStep::Begin);
            if self.fail_begin {
                anyhow::bail!("begin refused");
            }
            Ok(())
        })
    }

    fn commit<'a>(&'a self, _ctx: &'a Context) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.record(UowStep::Commit);
            if self.fail_commit {
                anyhow::bail!("commit refused");
            }
            Ok(())
        })
    }

    fn rollback<'a>(&'a self, _ctx: &'a Context) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.record(UowStep::Rollback);
            Ok(())
        })
    }
}
