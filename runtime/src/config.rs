//! Mediator configuration.
//!
//! [`MediatorConfig`] follows the builder style used for store configuration:
//! sensible defaults, `with_*` setters, and an environment loader for binaries.
//!
//! # Environment variables
//!
//! | Variable | Values | Default |
//! |----------|--------|---------|
//! | `MEDIATOR_PUBLISH_STRATEGY` | `fail_fast`, `run_all` | `fail_fast` |
//! | `MEDIATOR_DUPLICATE_POLICY` | `overwrite`, `reject` | `overwrite` |
//! | `MEDIATOR_DEFAULT_TIMEOUT_MS` | milliseconds, `0` disables | unset |
//! | `MEDIATOR_DRAIN_TIMEOUT_MS` | milliseconds | `30000` |

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Environment variable selecting the [`PublishStrategy`]
pub const ENV_PUBLISH_STRATEGY: &str = "MEDIATOR_PUBLISH_STRATEGY";
/// Environment variable selecting the [`DuplicatePolicy`]
pub const ENV_DUPLICATE_POLICY: &str = "MEDIATOR_DUPLICATE_POLICY";
/// Environment variable for the default request timeout, in milliseconds
pub const ENV_DEFAULT_TIMEOUT_MS: &str = "MEDIATOR_DEFAULT_TIMEOUT_MS";
/// Environment variable for the drain timeout, in milliseconds
pub const ENV_DRAIN_TIMEOUT_MS: &str = "MEDIATOR_DRAIN_TIMEOUT_MS";

/// Errors raised while reading configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable holds a value outside its accepted set.
    #[error("invalid value '{value}' for {key}: expected {expected}")]
    InvalidValue {
        /// Variable name
        key: String,
        /// Offending value
        value: String,
        /// Human readable description of accepted values
        expected: &'static str,
    },
}

/// How a synchronous `publish` reacts to a failing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishStrategy {
    /// Stop at the first failing subscriber and return its error.
    ///
    /// Subscribers registered after the failing one do not run.
    #[default]
    FailFast,
    /// Run every subscriber, then return all failures as
    /// [`MediatorError::Aggregate`](composable_mediator_core::error::MediatorError::Aggregate).
    RunAll,
}

impl FromStr for PublishStrategy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fail_fast" | "fail-fast" => Ok(Self::FailFast),
            "run_all" | "run-all" => Ok(Self::RunAll),
            _ => Err(ConfigError::InvalidValue {
                key: ENV_PUBLISH_STRATEGY.to_string(),
                value: value.to_string(),
                expected: "fail_fast or run_all",
            }),
        }
    }
}

impl fmt::Display for PublishStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailFast => write!(f, "fail_fast"),
            Self::RunAll => write!(f, "run_all"),
        }
    }
}

/// What happens when a request handler is registered under a name that is
/// already bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Replace the previous handler and log a warning.
    #[default]
    Overwrite,
    /// Keep the previous handler and fail the registration.
    Reject,
}

impl FromStr for DuplicatePolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Ok(Self::Overwrite),
            "reject" => Ok(Self::Reject),
            _ => Err(ConfigError::InvalidValue {
                key: ENV_DUPLICATE_POLICY.to_string(),
                value: value.to_string(),
                expected: "overwrite or reject",
            }),
        }
    }
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overwrite => write!(f, "overwrite"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// Configuration for [`Mediator`](crate::mediator::Mediator) instances
///
/// # Example
///
/// ```
/// use composable_mediator_runtime::config::{MediatorConfig, PublishStrategy};
/// use std::time::Duration;
///
/// let config = MediatorConfig::default()
///     .with_publish_strategy(PublishStrategy::RunAll)
///     .with_default_timeout(Some(Duration::from_secs(5)));
///
/// assert_eq!(config.publish_strategy, PublishStrategy::RunAll);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediatorConfig {
    /// Failure handling for synchronous publish
    pub publish_strategy: PublishStrategy,
    /// Handling of duplicate request handler registrations
    pub duplicate_policy: DuplicatePolicy,
    /// Timeout applied by `TimeoutBehavior` when built from this config.
    /// `None` means only the context deadline applies.
    pub default_timeout: Option<Duration>,
    /// Default wait for in-flight async subscribers in `drain`
    pub drain_timeout: Duration,
}

impl MediatorConfig {
    /// Set the publish strategy
    #[must_use]
    pub const fn with_publish_strategy(mut self, strategy: PublishStrategy) -> Self {
        self.publish_strategy = strategy;
        self
    }

    /// Set the duplicate registration policy
    #[must_use]
    pub const fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Set the default request timeout
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the drain timeout
    #[must_use]
    pub const fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Build a configuration from `MEDIATOR_*` environment variables.
    ///
    /// Unset variables keep their default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a variable is set to something
    /// that cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// [`from_env`](Self::from_env) delegates here; tests pass a map instead of
    /// mutating the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for unparsable values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_PUBLISH_STRATEGY) {
            config.publish_strategy = value.parse()?;
        }
        if let Some(value) = lookup(ENV_DUPLICATE_POLICY) {
            config.duplicate_policy = value.parse()?;
        }
        if let Some(value) = lookup(ENV_DEFAULT_TIMEOUT_MS) {
            let millis = parse_millis(ENV_DEFAULT_TIMEOUT_MS, &value)?;
            config.default_timeout = (millis > 0).then(|| Duration::from_millis(millis));
        }
        if let Some(value) = lookup(ENV_DRAIN_TIMEOUT_MS) {
            let millis = parse_millis(ENV_DRAIN_TIMEOUT_MS, &value)?;
            config.drain_timeout = Duration::from_millis(millis);
        }

        Ok(config)
    }
}

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            publish_strategy: PublishStrategy::FailFast,
            duplicate_policy: DuplicatePolicy::Overwrite,
            default_timeout: None,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

fn parse_millis(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: "a non-negative integer number of milliseconds",
        })
}
