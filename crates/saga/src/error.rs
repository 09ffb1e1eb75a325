//! Stage error types.

use broker::BrokerError;
use domain::{DomainError, OrderStatus};
use thiserror::Error;

/// Errors that can occur while a stage handles a record.
#[derive(Debug, Error)]
pub enum StageError {
    /// The payload could not be decoded into the topic's type.
    #[error("Cannot decode record {coordinates}: {source}")]
    Deserialization {
        coordinates: String,
        #[source]
        source: serde_json::Error,
    },

    /// The order arrived in a status the stage does not handle.
    #[error("Order {order_id} is {actual}, expected {expected}")]
    UnexpectedStatus {
        order_id: String,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    /// Inventory service error.
    #[error("Inventory service error: {0}")]
    Inventory(String),

    /// Payment gateway error.
    #[error("Payment gateway error: {0}")]
    Payment(String),

    /// Notification channel error.
    #[error("Notification channel error: {0}")]
    Notification(String),

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Broker error.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StageError {
    /// Returns true if handling the same record again might succeed.
    ///
    /// Malformed payloads, orders in the wrong status and illegal
    /// transitions fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        match self {
            StageError::Deserialization { .. }
            | StageError::UnexpectedStatus { .. }
            | StageError::Domain(_)
            | StageError::Serialization(_) => false,
            StageError::Inventory(_)
            | StageError::Payment(_)
            | StageError::Notification(_)
            | StageError::Broker(_) => true,
        }
    }

    /// Returns true if the record itself is malformed.
    pub fn is_deserialization(&self) -> bool {
        matches!(self, StageError::Deserialization { .. })
    }
}

/// Convenience type alias for stage results.
pub type Result<T> = std::result::Result<T, StageError>;
