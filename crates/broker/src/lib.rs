//! Partitioned message log for the order fulfillment system.
//!
//! - [`MessageBroker`] trait with in-memory and PostgreSQL implementations
//! - Kafka-compatible key partitioning, per-group committed offsets
//! - [`Checkpoint`]s for stateful consumers and [`DeadLetter`]s for poison records

pub mod broker;
pub mod checkpoint;
pub mod dead_letter;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod topic;

pub use broker::{BrokerExt, MessageBroker, RecordStream, partition_for_key};
pub use checkpoint::{Checkpoint, PartitionPosition};
pub use dead_letter::{DeadLetter, FailureKind};
pub use error::{BrokerError, Result};
pub use memory::InMemoryBroker;
pub use postgres::PostgresBroker;
pub use record::{Headers, Offset, ProducerRecord, ProducerRecordBuilder, Record, RecordMetadata};
pub use topic::TopicSpec;
