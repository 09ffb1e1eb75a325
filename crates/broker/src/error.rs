use thiserror::Error;

/// Errors that can occur when interacting with the message broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The topic has not been provisioned.
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    /// The partition does not exist on the topic.
    #[error("Partition {partition} out of range for topic {topic} ({partitions} partitions)")]
    UnknownPartition {
        topic: String,
        partition: u32,
        partitions: u32,
    },

    /// A producer record was built without a required field.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// The broker refused the write.
    #[error("Publish to {topic} rejected: {reason}")]
    PublishRejected { topic: String, reason: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
