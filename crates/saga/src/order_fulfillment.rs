//! Order fulfillment topology: stage names, consumer groups and defaults.

use std::sync::Arc;
use std::time::Duration;

use broker::{MessageBroker, topic};
use common::{Clock, RandomSource};
use domain::Money;

use crate::retry::RetryConfig;
use crate::runtime::{StageRegistry, Subscription};
use crate::services::{AvailabilityPolicy, NotificationChannel, PaymentGateway};
use crate::stages::{
    AuditStage, ConfirmationStage, InventoryStage, NotificationStage, PaymentStage,
    ShipmentStage, StageContext, ValidationStage,
};

/// Stage name: records `PENDING -> CONFIRMED`.
pub const STAGE_CONFIRMATION: &str = "OrderConsumer";

/// Stage name: applies the business rules.
pub const STAGE_VALIDATION: &str = "ValidationConsumer";

/// Stage name: reserves stock.
pub const STAGE_INVENTORY: &str = "InventoryConsumer";

/// Stage name: charges the customer.
pub const STAGE_PAYMENT: &str = "PaymentConsumer";

/// Stage name: hands the order to shipping.
pub const STAGE_SHIPMENT: &str = "ShippingConsumer";

/// Stage name: delivers customer notifications.
pub const STAGE_NOTIFICATION: &str = "NotificationConsumer";

/// Stage name: logs the audit stream.
pub const STAGE_AUDIT: &str = "EventLogConsumer";

pub const CONFIRMATION_GROUP: &str = "order-processing-group";
pub const VALIDATION_GROUP: &str = "validation-group";
pub const INVENTORY_GROUP: &str = "inventory-group";
pub const PAYMENT_GROUP: &str = "payment-group";
pub const SHIPPING_GROUP: &str = "shipping-group";
pub const NOTIFICATION_GROUP: &str = "notification-group";
pub const EVENT_LOG_GROUP: &str = "event-logging-group";

/// Header set on `order.shipped` records.
pub const HEADER_TRACKING_ENABLED: &str = "tracking-enabled";
pub const HEADER_EVENT_TYPE: &str = "event-type";
pub const HEADER_PRIORITY: &str = "priority";
pub const HEADER_CUSTOMER_ID: &str = "customer-id";

/// Number of workers per stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageConcurrency {
    pub confirmation: usize,
    pub validation: usize,
    pub inventory: usize,
    pub payment: usize,
    pub shipment: usize,
    pub notification: usize,
    pub audit: usize,
}

impl Default for StageConcurrency {
    fn default() -> Self {
        Self {
            confirmation: 3,
            validation: 2,
            inventory: 3,
            payment: 2,
            shipment: 3,
            notification: 2,
            audit: 2,
        }
    }
}

/// Artificial latencies of the simulated collaborators, as `base + U[0, spread)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyProfile {
    pub base: Duration,
    pub spread: Duration,
}

impl LatencyProfile {
    pub const fn new(base_ms: u64, spread_ms: u64) -> Self {
        Self {
            base: Duration::from_millis(base_ms),
            spread: Duration::from_millis(spread_ms),
        }
    }

    pub const fn none() -> Self {
        Self::new(0, 0)
    }

    pub const INVENTORY: LatencyProfile = LatencyProfile::new(500, 1000);
    pub const PAYMENT: LatencyProfile = LatencyProfile::new(1000, 2000);
    pub const NOTIFICATION: LatencyProfile = LatencyProfile::new(200, 500);
}

/// Stage tunables.
#[derive(Debug, Clone)]
pub struct FulfillmentSettings {
    pub concurrency: StageConcurrency,

    /// Records fetched per poll; also the audit batch size.
    pub max_poll_records: usize,

    /// Orders above this total are never auto-approved.
    pub high_value_threshold: Money,

    pub retry: RetryConfig,

    /// Completed order ids remembered per stage for duplicate suppression.
    pub ledger_capacity: usize,

    /// Idle wait between empty polls.
    pub poll_interval: Duration,
}

impl Default for FulfillmentSettings {
    fn default() -> Self {
        Self {
            concurrency: StageConcurrency::default(),
            max_poll_records: 100,
            high_value_threshold: Money::from_dollars(10_000),
            retry: RetryConfig::default(),
            ledger_capacity: 100_000,
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Everything the fulfillment stages need from the outside.
#[derive(Clone)]
pub struct StageDependencies<B> {
    pub broker: B,
    pub clock: Arc<dyn Clock>,
    pub random: Arc<dyn RandomSource>,
    pub inventory: Arc<dyn AvailabilityPolicy>,
    pub payments: Arc<dyn PaymentGateway>,
    pub channel: Arc<dyn NotificationChannel>,
    pub settings: FulfillmentSettings,
}

/// Wires every stage to its topic and consumer group.
pub fn fulfillment_registry<B: MessageBroker + Clone + 'static>(
    deps: &StageDependencies<B>,
) -> StageRegistry {
    let ctx = StageContext::new(deps.broker.clone(), Arc::clone(&deps.clock));
    let settings = &deps.settings;
    let workers = settings.concurrency;
    let capacity = settings.ledger_capacity;

    let mut registry = StageRegistry::new();
    registry
        .register(Subscription::new(
            topic::ORDER_CREATED,
            CONFIRMATION_GROUP,
            workers.confirmation,
            Arc::new(ConfirmationStage::new(ctx.clone(), capacity)),
        ))
        .register(Subscription::new(
            topic::ORDER_CREATED,
            VALIDATION_GROUP,
            workers.validation,
            Arc::new(ValidationStage::new(ctx.clone(), capacity)),
        ))
        .register(Subscription::new(
            topic::ORDER_INVENTORY,
            INVENTORY_GROUP,
            workers.inventory,
            Arc::new(InventoryStage::new(
                ctx.clone(),
                Arc::clone(&deps.inventory),
                capacity,
            )),
        ))
        .register(Subscription::new(
            topic::ORDER_PAYMENT,
            PAYMENT_GROUP,
            workers.payment,
            Arc::new(PaymentStage::new(
                ctx.clone(),
                Arc::clone(&deps.payments),
                Arc::clone(&deps.inventory),
                settings.high_value_threshold,
                capacity,
            )),
        ))
        .register(Subscription::new(
            topic::ORDER_SHIPPED,
            SHIPPING_GROUP,
            workers.shipment,
            Arc::new(ShipmentStage::new(ctx, capacity)),
        ))
        .register(Subscription::new(
            topic::ORDER_NOTIFICATIONS,
            NOTIFICATION_GROUP,
            workers.notification,
            Arc::new(NotificationStage::new(
                Arc::clone(&deps.channel),
                Arc::clone(&deps.clock),
                capacity,
            )),
        ))
        .register(
            Subscription::new(
                topic::ORDER_EVENTS,
                EVENT_LOG_GROUP,
                workers.audit,
                Arc::new(AuditStage::new()),
            )
            .batched(),
        );
    registry
}
