//! Error and retry-policy types for the provisioning domain.
//!
//! Two layers of error exist:
//!
//! - [`ProviderError`] is what a provider port returns: a classified failure
//!   of one remote call.
//! - [`ProvisionError`] is what a provisioner returns: the provider failure
//!   placed in context (which operation, which resource) and folded into the
//!   NotFound / AlreadyExists / Transient / other taxonomy callers act on.
//!
//! [`RetryPolicy`] tells a *caller* whether repeating the operation is
//! reasonable. Nothing in this workspace retries on its own.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ResourceKind;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried by the caller.
    Retryable {
        /// Minimum back-off before the next attempt, when the provider
        /// supplied one (e.g. a `Retry-After` header).
        after: Option<Duration>,
    },
    /// Retrying the same call cannot succeed without a change of input or state.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Provider errors
// ---------------------------------------------------------------------------

/// Classification of a failed provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// The target does not exist.
    NotFound,
    /// A create target already exists.
    AlreadyExists,
    /// The provider rejected the call due to rate limiting.
    Throttled,
    /// The call, or a bounded wait, did not complete in time.
    Timeout,
    /// The provider could not be reached or answered with a server error.
    Unavailable,
    /// Credentials are missing, invalid or lack permission.
    AccessDenied,
    /// The provider rejected the request as malformed.
    InvalidRequest,
    /// Anything else.
    Other,
}

impl ProviderErrorKind {
    /// Throttling, timeouts and outages are infrastructure conditions.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Throttled | Self::Timeout | Self::Unavailable)
    }
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::NotFound => "not found",
            Self::AlreadyExists => "already exists",
            Self::Throttled => "throttled",
            Self::Timeout => "timed out",
            Self::Unavailable => "unavailable",
            Self::AccessDenied => "access denied",
            Self::InvalidRequest => "invalid request",
            Self::Other => "provider error",
        };
        f.write_str(label)
    }
}

/// A failed call against one external system.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[error("{operation}: {kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    /// Name of the provider call that failed (e.g. `"CreateFunction"`).
    pub operation: String,
    /// Provider-supplied detail.
    pub message: String,
    /// Back-off hint supplied by the provider, if any.
    pub retry_after: Option<Duration>,
}

impl ProviderError {
    pub fn new(
        kind: ProviderErrorKind,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            operation: operation.into(),
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn not_found(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::NotFound, operation, message)
    }

    pub fn already_exists(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::AlreadyExists, operation, message)
    }

    /// Attaches a provider back-off hint.
    pub fn with_retry_after(mut self, after: Duration) -> Self {
        self.retry_after = Some(after);
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ProviderErrorKind::NotFound
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind == ProviderErrorKind::AlreadyExists
    }
}

// ---------------------------------------------------------------------------
// Provisioner errors
// ---------------------------------------------------------------------------

/// A provisioner operation failed.
///
/// Every variant names the operation and the resource it targeted so the
/// caller can retry or clean up by hand.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The target does not exist. Lookups turn this into "absent"; deletes
    /// and updates surface it.
    ///
    /// `source` is `None` only when the condition was detected without a
    /// provider call failing (e.g. a lookup that came back empty).
    #[error("{operation}: {resource} '{id}': {}", detail(.source, "does not exist"))]
    NotFound {
        resource: ResourceKind,
        id: String,
        operation: &'static str,
        #[source]
        source: Option<ProviderError>,
    },

    /// A create target already exists.
    #[error("{operation}: {resource} '{id}': {}", detail(.source, "already exists"))]
    AlreadyExists {
        resource: ResourceKind,
        id: String,
        operation: &'static str,
        #[source]
        source: Option<ProviderError>,
    },

    /// Throttling, timeout, or outage. Not retried automatically.
    #[error("{operation}: transient failure on {resource} '{id}': {source}")]
    Transient {
        resource: ResourceKind,
        id: String,
        operation: &'static str,
        #[source]
        source: ProviderError,
    },

    /// Any other provider failure, including permission errors.
    #[error("{operation}: {resource} '{id}' failed: {source}")]
    Provider {
        resource: ResourceKind,
        id: String,
        operation: &'static str,
        #[source]
        source: ProviderError,
    },

    /// The deployment package could not be built.
    #[error("deployment package could not be built: {0}")]
    Package(String),

    /// The request was rejected before any provider call was made.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Provider detail when there is some, otherwise the bare condition.
fn detail(source: &Option<ProviderError>, condition: &str) -> String {
    match source {
        Some(source) => source.to_string(),
        None => condition.to_owned(),
    }
}

impl ProvisionError {
    /// Places a provider failure in the context of a provisioner operation.
    pub fn from_provider(
        resource: ResourceKind,
        id: impl std::fmt::Display,
        operation: &'static str,
        source: ProviderError,
    ) -> Self {
        let id = id.to_string();
        match source.kind {
            ProviderErrorKind::NotFound => Self::NotFound {
                resource,
                id,
                operation,
                source: Some(source),
            },
            ProviderErrorKind::AlreadyExists => Self::AlreadyExists {
                resource,
                id,
                operation,
                source: Some(source),
            },
            kind if kind.is_transient() => Self::Transient {
                resource,
                id,
                operation,
                source,
            },
            _ => Self::Provider {
                resource,
                id,
                operation,
                source,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Whether a caller may reasonably repeat the failed operation unchanged.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Transient { source, .. } => RetryPolicy::Retryable {
                after: source.retry_after,
            },
            _ => RetryPolicy::NonRetryable,
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// The deploy configuration is invalid. Produced before any provider call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required setting has no value.
    #[error("missing configuration value: {0}")]
    Missing(&'static str),

    /// A setting has a value that cannot be used.
    #[error("invalid configuration value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kinds_fold_into_the_taxonomy() {
        let err = ProvisionError::from_provider(
            ResourceKind::Function,
            "demo",
            "create",
            ProviderError::already_exists("CreateFunction", "Function already exist: demo"),
        );
        assert!(err.is_already_exists());
        assert_eq!(
            err.to_string(),
            "create: function 'demo': CreateFunction: already exists: Function already exist: demo"
        );

        let err = ProvisionError::from_provider(
            ResourceKind::Gateway,
            "abc123",
            "delete",
            ProviderError::not_found("DeleteRestApi", "Invalid API identifier"),
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn not_found_keeps_the_provider_cause() {
        let err = ProvisionError::from_provider(
            ResourceKind::Gateway,
            "4d7d077118",
            "bind function",
            ProviderError::not_found("PutIntegration", "Invalid Method identifier specified"),
        );
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(
            source.as_deref(),
            Some("PutIntegration: not found: Invalid Method identifier specified")
        );
        assert!(err.to_string().contains("Invalid Method identifier specified"));
        assert!(!err.to_string().contains("does not exist"));
    }

    #[test]
    fn synthesized_not_found_has_no_cause() {
        let err = ProvisionError::NotFound {
            resource: ResourceKind::Function,
            id: "demo".into(),
            operation: "update",
            source: None,
        };
        assert_eq!(err.to_string(), "update: function 'demo': does not exist");
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn only_transient_failures_are_retryable() {
        let throttled = ProviderError::new(ProviderErrorKind::Throttled, "ListFunctions", "slow down")
            .with_retry_after(Duration::from_secs(2));
        let err = ProvisionError::from_provider(ResourceKind::Function, "*", "list", throttled);
        assert_eq!(
            err.retry_policy(),
            RetryPolicy::Retryable {
                after: Some(Duration::from_secs(2))
            }
        );

        let denied = ProviderError::new(ProviderErrorKind::AccessDenied, "CreateFunction", "no");
        let err = ProvisionError::from_provider(ResourceKind::Function, "demo", "create", denied);
        assert!(matches!(err, ProvisionError::Provider { .. }));
        assert_eq!(err.retry_policy(), RetryPolicy::NonRetryable);
    }
}
