//! Name-keyed handler registry.
//!
//! Commands and queries share one namespace with exactly one handler per name.
//! Notifications map a name to an ordered list of subscribers.
//!
//! Lookups return `Arc` clones so the lock is released before any handler runs;
//! a handler may therefore register further handlers or dispatch new requests
//! without deadlocking.

use crate::config::DuplicatePolicy;
use composable_mediator_core::error::MediatorError;
use composable_mediator_core::handler::{NotificationHandler, RequestHandler};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

type RequestHandlers = HashMap<Arc<str>, Arc<dyn RequestHandler>>;
type NotificationHandlers = HashMap<Arc<str>, Vec<Arc<dyn NotificationHandler>>>;

/// Registry of request handlers and notification subscribers.
pub struct HandlerRegistry {
    policy: DuplicatePolicy,
    requests: RwLock<RequestHandlers>,
    notifications: RwLock<NotificationHandlers>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            policy,
            requests: RwLock::new(HashMap::new()),
            notifications: RwLock::new(HashMap::new()),
        }
    }

    /// Duplicate policy in effect
    #[must_use]
    pub const fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Bind a command handler to `name`.
    ///
    /// # Errors
    ///
    /// - [`MediatorError::InvalidName`] for an empty name.
    /// - [`MediatorError::DuplicateHandler`] when the name is bound and the
    ///   policy is [`DuplicatePolicy::Reject`].
    pub fn register_command_handler(
        &self,
        name: &str,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<(), MediatorError> {
        self.bind(name, handler, "command")
    }

    /// Bind a query handler to `name`.
    ///
    /// Queries share the command namespace: registering a query under a
    /// command's name replaces (or conflicts with) the command handler.
    ///
    /// # Errors
    ///
    /// Same as [`register_command_handler`](Self::register_command_handler).
    pub fn register_query_handler(
        &self,
        name: &str,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<(), MediatorError> {
        self.bind(name, handler, "query")
    }

    fn bind(
        &self,
        name: &str,
        handler: Arc<dyn RequestHandler>,
        kind: &'static str,
    ) -> Result<(), MediatorError> {
        if name.is_empty() {
            return Err(MediatorError::InvalidName);
        }

        let mut requests = self.requests.write().unwrap_or_else(PoisonError::into_inner);
        if requests.contains_key(name) {
            match self.policy {
                DuplicatePolicy::Reject => {
                    tracing::warn!(request = name, kind, "Rejected duplicate handler registration");
                    return Err(MediatorError::DuplicateHandler(name.to_string()));
                }
                DuplicatePolicy::Overwrite => {
                    tracing::warn!(request = name, kind, "Replacing previously registered handler");
                }
            }
        }

        requests.insert(Arc::from(name), handler);
        tracing::debug!(request = name, kind, "Registered request handler");
        Ok(())
    }

    /// Append a notification subscriber for `name`.
    ///
    /// Subscribers run in the order they were registered.
    ///
    /// # Errors
    ///
    /// [`MediatorError::InvalidName`] for an empty name.
    pub fn register_notification_handler(
        &self,
        name: &str,
        handler: Arc<dyn NotificationHandler>,
    ) -> Result<(), MediatorError> {
        if name.is_empty() {
            return Err(MediatorError::InvalidName);
        }

        let mut notifications = self
            .notifications
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let subscribers = notifications.entry(Arc::from(name)).or_default();
        subscribers.push(handler);
        tracing::debug!(
            notification = name,
            subscribers = subscribers.len(),
            "Registered notification handler"
        );
        Ok(())
    }

    /// The handler bound to `name`, if any.
    #[must_use]
    pub fn request_handler(&self, name: &str) -> Option<Arc<dyn RequestHandler>> {
        self.requests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Snapshot of the subscribers for `name`, in registration order.
    ///
    /// Subscribers registered after the snapshot was taken are not included.
    #[must_use]
    pub fn notification_handlers(&self, name: &str) -> Vec<Arc<dyn NotificationHandler>> {
        self.notifications
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether a request handler is bound to `name`
    #[must_use]
    pub fn has_request_handler(&self, name: &str) -> bool {
        self.requests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Every bound request name, sorted
    #[must_use]
    pub fn request_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .requests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .map(ToString::to_string)
            .collect();
        names.sort_unstable();
        names
    }

    /// Number of subscribers for `name`
    #[must_use]
    pub fn notification_handler_count(&self, name: &str) -> usize {
        self.notifications
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map_or(0, Vec::len)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new(DuplicatePolicy::default())
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("policy", &self.policy)
            .field("requests", &self.request_names())
            .finish_non_exhaustive()
    }
}
