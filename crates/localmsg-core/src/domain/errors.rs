//! Errors - error taxonomy for the outbox.
//!
//! The only errors a caller of `exec_tx` can see mean "nothing was written".
//! Failures after commit are logged and left to the reconciler.

use std::time::Duration;

use thiserror::Error;

use super::MessageId;

/// Boxed error produced by a caller's business operation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error returned by the coordinator and the publisher.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// No destination could be resolved. No writes were performed.
    #[error("routing failed: {0}")]
    Routing(#[from] RoutingError),

    /// The caller's operation failed and the transaction was rolled back.
    #[error("business operation failed: {0}")]
    Business(#[source] BoxError),

    /// A store call (insert/select/update/commit) failed.
    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),

    /// The broker did not acknowledge the message.
    #[error("publish failed: {0}")]
    Publish(#[from] BrokerError),
}

impl OutboxError {
    pub fn business<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        OutboxError::Business(err.into())
    }

    /// The caller's own error, if this is a business failure.
    pub fn business_source(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            OutboxError::Business(err) => Some(err.as_ref()),
            _ => None,
        }
    }

    /// Timeouts and outages are worth retrying; routing and business
    /// failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            OutboxError::Routing(_) | OutboxError::Business(_) => false,
            OutboxError::Persistence(err) => err.is_transient(),
            OutboxError::Publish(err) => err.is_transient(),
        }
    }
}

/// Failure to map a routing key to a live store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("no store registered under id '{0}'")]
    UnknownStore(String),

    #[error("key cannot be routed: {0}")]
    Unroutable(String),
}

/// Failure reported by a message store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("table '{0}' does not exist")]
    TableNotFound(String),

    #[error("row {id} not found in table '{table}'")]
    RowNotFound { table: String, id: MessageId },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation '{operation}' timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout { .. })
    }
}

/// Failure reported by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("broker rejected message for topic '{topic}': {reason}")]
    Rejected { topic: String, reason: String },

    #[error("broker send timed out after {0:?}")]
    Timeout(Duration),
}

impl BrokerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Unavailable(_) | BrokerError::Timeout(_))
    }
}
