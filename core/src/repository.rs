//! Persistence collaborator contract.
//!
//! The mediator never talks to storage itself. Application services persist
//! aggregates through a [`Repository`] and only then publish the aggregate's
//! domain events. The trait is the narrow shape the dispatch core relies on:
//! add a new aggregate, update an existing one, load one by id.
//!
//! Like the handler traits it returns boxed futures so repositories can be
//! shared as `Arc<dyn Repository<A>>`.

use crate::aggregate::AggregateRoot;
use crate::context::Context;
use futures::future::BoxFuture;
use thiserror::Error;

/// Errors reported by a repository.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// No aggregate stored under the id.
    #[error("aggregate not found: {0}")]
    NotFound(String),

    /// An aggregate with the same id already exists.
    #[error("aggregate already exists: {0}")]
    AlreadyExists(String),

    /// The storage backend failed.
    #[error("storage backend failed: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Stores aggregates of type `A`.
pub trait Repository<A: AggregateRoot>: Send + Sync {
    /// Persist a new aggregate.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::AlreadyExists`] when the id is taken, or
    /// [`RepositoryError::Backend`] when storage fails.
    fn add<'a>(&'a self, ctx: &'a Context, aggregate: &'a A)
    -> BoxFuture<'a, Result<(), RepositoryError>>;

    /// Persist changes to an existing aggregate.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] when the aggregate was never added, or
    /// [`RepositoryError::Backend`] when storage fails.
    fn update<'a>(
        &'a self,
        ctx: &'a Context,
        aggregate: &'a A,
    ) -> BoxFuture<'a, Result<(), RepositoryError>>;

    /// Load an aggregate by id. `Ok(None)` when it does not exist.
    ///
    /// Loaded aggregates carry no pending domain events.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::Backend`] when storage fails.
    fn get<'a>(
        &'a self,
        ctx: &'a Context,
        id: &'a A::Id,
    ) -> BoxFuture<'a, Result<Option<A>, RepositoryError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_convert_from_anyhow() {
        let error: RepositoryError = anyhow::anyhow!("connection reset").into();

        assert!(matches!(error, RepositoryError::Backend(_)));
        assert_eq!(error.to_string(), "storage backend failed: connection reset");
    }

    #[test]
    fn messages_name_the_aggregate() {
        assert_eq!(
            RepositoryError::NotFound("order 7".into()).to_string(),
            "aggregate not found: order 7"
        );
        assert_eq!(
            RepositoryError::AlreadyExists("order 7".into()).to_string(),
            "aggregate already exists: order 7"
        );
    }
}
