//! Order fulfillment workflow.
//!
//! Orders move through a chain of independent stages connected only by
//! broker topics:
//!
//! 1. Confirmation and validation read `order.created`
//! 2. Inventory reserves stock
//! 3. Payment charges the customer, releasing stock again on failure
//! 4. Shipment hands the order over and issues a tracking number
//!
//! Every status change is recorded on `order.events`, and customer-facing
//! outcomes are queued on `order.notifications`. The [`ConsumerRuntime`]
//! drives the stages with at-least-once delivery, retries transient
//! failures and routes poison records to `order.dead-letter`.

pub mod error;
pub mod handler;
pub mod idempotency;
pub mod order_fulfillment;
pub mod relay;
pub mod retry;
pub mod runtime;
pub mod services;
pub mod stages;

pub use error::{Result, StageError};
pub use handler::MessageHandler;
pub use idempotency::ProcessedLedger;
pub use order_fulfillment::{
    FulfillmentSettings, LatencyProfile, StageConcurrency, StageDependencies,
    fulfillment_registry,
};
pub use relay::{DeadLetterRouter, EventPublisher, NotificationDispatcher, OrderRelay};
pub use retry::RetryConfig;
pub use runtime::{ConsumerRuntime, StageRegistry, Subscription};
pub use services::{
    Availability, AvailabilityPolicy, InMemoryChannel, InMemoryInventory,
    InMemoryPaymentGateway, NotificationChannel, PaymentGateway, PaymentOutcome,
    ProbabilisticAvailability, SimulatedChannel, SimulatedPaymentGateway,
};
