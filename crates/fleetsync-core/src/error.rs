//! Error types for the fleetsync controller
//!
//! Errors fall into two groups: those that fail a whole reconciliation
//! tick (inventory fetch, DNS apply) and those scoped to a single instance
//! that are collected and logged while the tick carries on.

use thiserror::Error;

/// Result type alias for fleetsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the fleetsync controller
#[derive(Error, Debug)]
pub enum Error {
    /// Inventory fetch failed; the current tick is aborted
    #[error("Inventory error: {0}")]
    Inventory(String),

    /// An inventory record had no instance identifier
    #[error("Malformed inventory record: {0}")]
    MalformedRecord(String),

    /// An instance reported a lifecycle state we do not recognise
    #[error("Unknown instance state for instance {instance_id:?}: {state:?}")]
    UnknownState {
        /// Instance identifier
        instance_id: String,
        /// Raw state string reported by the provider
        state: String,
    },

    /// Source/destination check mutation failed for one instance
    #[error("Failed to configure SourceDestCheck for instance {instance_id:?}: {message}")]
    Policy {
        /// Instance identifier
        instance_id: String,
        /// Underlying failure
        message: String,
    },

    /// DNS batch apply failed; baseline is left untouched
    #[error("Error applying DNS changes: {0}")]
    DnsApply(String),

    /// A stop request arrived while shutdown was already underway
    #[error("Shutdown already in progress")]
    AlreadyStopping,

    /// The controller's periodic driver was started twice
    #[error("Controller already started")]
    AlreadyStarted,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors (from provider APIs)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an inventory error
    pub fn inventory(msg: impl Into<String>) -> Self {
        Self::Inventory(msg.into())
    }

    /// Create a malformed-record error
    pub fn malformed_record(msg: impl Into<String>) -> Self {
        Self::MalformedRecord(msg.into())
    }

    /// Create an unknown-state error
    pub fn unknown_state(instance_id: impl Into<String>, state: impl Into<String>) -> Self {
        Self::UnknownState {
            instance_id: instance_id.into(),
            state: state.into(),
        }
    }

    /// Create a per-instance policy error
    pub fn policy(instance_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Policy {
            instance_id: instance_id.into(),
            message: message.into(),
        }
    }

    /// Create a DNS apply error
    pub fn dns_apply(msg: impl Into<String>) -> Self {
        Self::DnsApply(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether this error aborts a reconciliation tick.
    ///
    /// Per-instance errors are collected instead.
    pub fn is_fatal_for_tick(&self) -> bool {
        !matches!(
            self,
            Error::MalformedRecord(_) | Error::UnknownState { .. } | Error::Policy { .. }
        )
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_instance_errors_are_not_fatal() {
        assert!(!Error::malformed_record("no id").is_fatal_for_tick());
        assert!(!Error::unknown_state("i-1", "rebooting").is_fatal_for_tick());
        assert!(!Error::policy("i-1", "denied").is_fatal_for_tick());

        assert!(Error::inventory("timeout").is_fatal_for_tick());
        assert!(Error::dns_apply("throttled").is_fatal_for_tick());
    }

    #[test]
    fn test_policy_error_names_instance() {
        let err = Error::policy("i-0abc", "UnauthorizedOperation");
        let msg = err.to_string();
        assert!(msg.contains("i-0abc"));
        assert!(msg.contains("UnauthorizedOperation"));
    }
}
