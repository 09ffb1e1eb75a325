//! Analytics error types.

use thiserror::Error;

/// Errors that can occur while computing analytics.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// An error occurred in the broker.
    #[error("Broker error: {0}")]
    Broker(#[from] broker::BrokerError),

    /// Failed to serialize output or aggregation state.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A saved checkpoint does not match the registered aggregations.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),
}

/// Result type for analytics operations.
pub type Result<T> = std::result::Result<T, AnalyticsError>;
