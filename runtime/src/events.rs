//! Publish after persist.
//!
//! [`EventDispatcher`] is the application-layer half of the aggregate event
//! contract. It persists the aggregate first, then publishes each pending
//! domain event, in append order, then clears the queue:
//!
//! ```text
//! persist ── err ──→ Err(Persistence), events untouched
//!    │
//!    ▼
//! publish e₁ → publish e₂ → …   (failures logged and reported, never undo persistence)
//!    │
//!    ▼
//! clear_domain_events()
//! ```
//!
//! A subscriber that loads the aggregate from the repository therefore always
//! sees the persisted state.

use crate::mediator::Mediator;
use composable_mediator_core::aggregate::AggregateRoot;
use composable_mediator_core::context::Context;
use composable_mediator_core::error::MediatorError;
use composable_mediator_core::event::DomainEvent;
use composable_mediator_core::notification::Notification;
use composable_mediator_core::repository::Repository;
use std::sync::Arc;

/// How the aggregate is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persist {
    /// New aggregate, [`Repository::add`]
    Add,
    /// Existing aggregate, [`Repository::update`]
    Update,
}

/// A subscriber failure observed while publishing one event.
#[derive(Debug)]
pub struct PublishFailure {
    /// Name of the event whose publish failed
    pub event: &'static str,
    /// Error returned by `publish`
    pub error: MediatorError,
}

/// Outcome of [`EventDispatcher::persist_and_publish`].
///
/// Persistence succeeded whenever a report is returned; the report only says
/// how publishing went.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Events published without error
    pub published: usize,
    /// Events whose publish returned an error
    pub failures: Vec<PublishFailure>,
}

impl DispatchReport {
    /// `true` when every event was published without error
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total events handled, successful or not
    #[must_use]
    pub fn total(&self) -> usize {
        self.published + self.failures.len()
    }
}

/// Persists aggregates of type `A` and publishes their domain events.
pub struct EventDispatcher<A: AggregateRoot> {
    mediator: Arc<Mediator>,
    repository: Arc<dyn Repository<A>>,
}

impl<A: AggregateRoot> EventDispatcher<A> {
    /// Create a dispatcher writing through `repository` and publishing through `mediator`.
    #[must_use]
    pub fn new(mediator: Arc<Mediator>, repository: Arc<dyn Repository<A>>) -> Self {
        Self {
            mediator,
            repository,
        }
    }

    /// The repository aggregates are written to
    #[must_use]
    pub fn repository(&self) -> &Arc<dyn Repository<A>> {
        &self.repository
    }

    /// Persist `aggregate`, then publish and clear its pending events.
    ///
    /// Events are snapshotted after persistence succeeds and published one by
    /// one under their own names. A failing publish is logged, counted and
    /// recorded in the report; the remaining events are still published and
    /// the queue is still cleared.
    ///
    /// # Errors
    ///
    /// [`MediatorError::Persistence`] when the repository fails. Nothing is
    /// published and the pending events stay on the aggregate.
    #[tracing::instrument(
        skip(self, ctx, aggregate),
        fields(aggregate_id = ?aggregate.id()),
        name = "persist_and_publish"
    )]
    pub async fn persist_and_publish(
        &self,
        ctx: &Context,
        aggregate: &mut A,
        persist: Persist,
    ) -> Result<DispatchReport, MediatorError> {
        let persisted = match persist {
            Persist::Add => self.repository.add(ctx, aggregate).await,
            Persist::Update => self.repository.update(ctx, aggregate).await,
        };

        if let Err(error) = persisted {
            tracing::warn!(
                error = %error,
                pending_events = aggregate.domain_events().len(),
                "Persistence failed, domain events not published"
            );
            return Err(MediatorError::Persistence(error));
        }

        let events = aggregate.domain_events().to_vec();
        let mut report = DispatchReport::default();

        for event in events {
            let name = event.event_name();
            match self
                .mediator
                .publish(ctx.clone(), Notification::from_event(event))
                .await
            {
                Ok(()) => report.published += 1,
                Err(error) => {
                    metrics::counter!("mediator.events.publish_failed", "event" => name)
                        .increment(1);
                    tracing::warn!(event = name, error = %error, "Failed to publish domain event");
                    report.failures.push(PublishFailure { event: name, error });
                }
            }
        }

        aggregate.clear_domain_events();
        tracing::debug!(
            published = report.published,
            failed = report.failures.len(),
            "Domain events dispatched"
        );

        Ok(report)
    }
}

impl<A: AggregateRoot> std::fmt::Debug for EventDispatcher<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("mediator", &self.mediator)
            .finish_non_exhaustive()
    }
}
