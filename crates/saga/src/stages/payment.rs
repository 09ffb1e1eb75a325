use std::sync::Arc;

use async_trait::async_trait;
use broker::{MessageBroker, Record};
use domain::{Money, NotificationType, Order, OrderStatus, event_types};

use super::{StageContext, expect_status, quantity_metadata};
use crate::error::Result;
use crate::handler::{MessageHandler, decode};
use crate::idempotency::{PendingResults, ProcessedLedger};
use crate::order_fulfillment::STAGE_PAYMENT;
use crate::services::{AvailabilityPolicy, PaymentGateway, PaymentOutcome};

pub const HIGH_VALUE_REASON: &str = "High-value transaction requires manual approval";

/// Charges customers and compensates inventory when a charge fails.
pub struct PaymentStage<B> {
    ctx: StageContext<B>,
    gateway: Arc<dyn PaymentGateway>,
    inventory: Arc<dyn AvailabilityPolicy>,
    high_value_threshold: Money,
    ledger: ProcessedLedger,
    /// Outcomes of charges whose follow-up publishes have not all succeeded
    /// yet, so a retried record is never charged twice.
    settled: PendingResults<PaymentOutcome>,
}

impl<B: MessageBroker + Clone> PaymentStage<B> {
    pub fn new(
        ctx: StageContext<B>,
        gateway: Arc<dyn PaymentGateway>,
        inventory: Arc<dyn AvailabilityPolicy>,
        high_value_threshold: Money,
        ledger_capacity: usize,
    ) -> Self {
        Self {
            ctx,
            gateway,
            inventory,
            high_value_threshold,
            ledger: ProcessedLedger::new(ledger_capacity),
            settled: PendingResults::new(ledger_capacity),
        }
    }

    /// Decides the charge outcome. High-value orders never reach the gateway
    /// and gateway errors count as declines.
    async fn charge(&self, order: &Order) -> PaymentOutcome {
        if let Some(outcome) = self.settled.get(order.order_id.as_str()) {
            return outcome;
        }

        let outcome = if order.total_amount > self.high_value_threshold {
            tracing::warn!(
                order_id = %order.order_id,
                amount = %order.total_amount,
                "high-value transaction requires manual approval"
            );
            PaymentOutcome::Declined {
                reason: HIGH_VALUE_REASON.to_string(),
            }
        } else {
            match self.gateway.charge(order).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(order_id = %order.order_id, error = %e, "payment gateway error");
                    PaymentOutcome::Declined {
                        reason: e.to_string(),
                    }
                }
            }
        };

        self.settled.insert(order.order_id.as_str(), outcome.clone());
        outcome
    }

    async fn completed(&self, mut order: Order, transaction_id: String) -> Result<()> {
        order.payment_info.capture(transaction_id.clone());
        let event = self
            .ctx
            .transition(
                &mut order,
                OrderStatus::PaymentCompleted,
                event_types::PAYMENT_COMPLETED,
                STAGE_PAYMENT,
            )?
            .with_description("Payment processed successfully")
            .with_metadata("transactionId", transaction_id.as_str())
            .with_metadata("amount", order.total_amount.to_string())
            .with_metadata("paymentMethod", order.payment_info.payment_method.as_str());

        self.ctx.orders.send_shipped(&order).await?;
        self.ctx.events.publish(&event).await?;
        self.ctx
            .notify(
                &order,
                NotificationType::PaymentSuccess,
                "Payment Successful",
                format!(
                    "Your payment of {} has been processed successfully.",
                    order.total_amount
                ),
            )
            .await?;

        tracing::info!(order_id = %order.order_id, transaction_id, "payment successful");
        metrics::counter!("payments_completed_total").increment(1);
        Ok(())
    }

    async fn failed(&self, mut order: Order, reason: &str) -> Result<()> {
        order.payment_info.decline();
        let event = self
            .ctx
            .transition(
                &mut order,
                OrderStatus::PaymentFailed,
                event_types::PAYMENT_FAILED,
                STAGE_PAYMENT,
            )?
            .with_description("Payment processing failed")
            .with_metadata("reason", reason);
        self.ctx.events.publish(&event).await?;
        self.ctx
            .notify(
                &order,
                NotificationType::PaymentFailed,
                "Payment Failed",
                format!("Payment processing failed for order {}", order.order_id),
            )
            .await?;

        tracing::warn!(order_id = %order.order_id, reason, "payment failed");
        metrics::counter!("payments_failed_total").increment(1);

        self.release_inventory(order).await
    }

    /// Compensation: hands reserved stock back and cancels the order.
    async fn release_inventory(&self, mut order: Order) -> Result<()> {
        if let Err(e) = self.inventory.release(&order).await {
            tracing::error!(
                order_id = %order.order_id,
                error = %e,
                "inventory release failed, order left in PAYMENT_FAILED"
            );
            metrics::counter!("compensation_failures_total").increment(1);
            return Ok(());
        }

        let event = self
            .ctx
            .transition(
                &mut order,
                OrderStatus::Cancelled,
                event_types::INVENTORY_RELEASED,
                STAGE_PAYMENT,
            )?
            .with_description("Inventory released after payment failure");
        let event = quantity_metadata(event, &order);
        self.ctx.events.publish(&event).await?;

        tracing::info!(order_id = %order.order_id, "inventory released");
        Ok(())
    }
}

#[async_trait]
impl<B: MessageBroker + Clone + 'static> MessageHandler for PaymentStage<B> {
    fn name(&self) -> &'static str {
        STAGE_PAYMENT
    }

    #[tracing::instrument(skip_all, fields(stage = STAGE_PAYMENT, source = %record.coordinates()))]
    async fn handle(&self, record: &Record) -> Result<()> {
        let mut order: Order = decode(record)?;
        let order_id = order.order_id.to_string();
        if self.ledger.contains(&order_id) {
            tracing::debug!(order_id, "duplicate delivery skipped");
            return Ok(());
        }
        expect_status(&order, OrderStatus::InventoryReserved)?;

        tracing::info!(
            order_id,
            amount = %order.total_amount,
            method = %order.payment_info.payment_method,
            "processing payment"
        );

        let event = self
            .ctx
            .transition(
                &mut order,
                OrderStatus::PaymentProcessing,
                event_types::PAYMENT_PROCESSING,
                STAGE_PAYMENT,
            )?
            .with_description("Payment processing started");
        self.ctx.events.publish(&event).await?;

        match self.charge(&order).await {
            PaymentOutcome::Approved { transaction_id } => {
                self.completed(order, transaction_id).await?
            }
            PaymentOutcome::Declined { reason } => self.failed(order, &reason).await?,
        }

        self.ledger.mark(&order_id);
        self.settled.remove(&order_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker::{BrokerExt, InMemoryBroker, topic};
    use chrono::Utc;
    use common::ManualClock;
    use domain::{Address, OrderItem};

    use crate::services::{InMemoryInventory, InMemoryPaymentGateway};

    fn stage(broker: &InMemoryBroker, payments: &InMemoryPaymentGateway) -> PaymentStage<InMemoryBroker> {
        PaymentStage::new(
            StageContext::new(broker.clone(), Arc::new(ManualClock::default())),
            Arc::new(payments.clone()),
            Arc::new(InMemoryInventory::new()),
            Money::from_dollars(10_000),
            100,
        )
    }

    async fn reserved_order(broker: &InMemoryBroker) -> Record {
        let mut order = Order::builder()
            .order_id("order-1")
            .customer("CUST-1", "Ada", "ada@example.com")
            .item(OrderItem::new("SKU-001", "Widget", 2, Money::from_dollars(5)))
            .shipping_address(Address::new("1 Main St", "Springfield", "IL", "62701", "USA"))
            .build();
        let now = Utc::now();
        for next in [
            OrderStatus::Confirmed,
            OrderStatus::Validated,
            OrderStatus::InventoryReserved,
        ] {
            order.transition_to(next, now).unwrap();
        }
        broker
            .publish_json(topic::ORDER_PAYMENT, order.order_id.as_str(), &order)
            .await
            .unwrap();
        broker.records(topic::ORDER_PAYMENT).await.remove(0)
    }

    #[tokio::test]
    async fn retry_after_failed_follow_up_reuses_the_charge() {
        let broker = InMemoryBroker::new();
        let payments = InMemoryPaymentGateway::new();
        let stage = stage(&broker, &payments);
        let record = reserved_order(&broker).await;

        broker.set_fail_on_publish(topic::ORDER_SHIPPED, true);
        assert!(stage.handle(&record).await.is_err());
        assert_eq!(payments.attempts(), 1);
        assert_eq!(stage.settled.len(), 1);

        broker.set_fail_on_publish(topic::ORDER_SHIPPED, false);
        stage.handle(&record).await.unwrap();

        assert_eq!(payments.attempts(), 1);
        assert_eq!(broker.record_count(topic::ORDER_SHIPPED).await, 1);
        assert!(stage.settled.is_empty());
    }

    #[tokio::test]
    async fn failed_notification_after_charge_is_retried_without_recharging() {
        let broker = InMemoryBroker::new();
        let payments = InMemoryPaymentGateway::new();
        let stage = stage(&broker, &payments);
        let record = reserved_order(&broker).await;

        broker.set_fail_on_publish(topic::ORDER_NOTIFICATIONS, true);
        assert!(stage.handle(&record).await.is_err());
        broker.set_fail_on_publish(topic::ORDER_NOTIFICATIONS, false);
        stage.handle(&record).await.unwrap();

        assert_eq!(payments.attempts(), 1);
        assert_eq!(broker.record_count(topic::ORDER_NOTIFICATIONS).await, 1);
    }

    #[tokio::test]
    async fn redelivery_after_success_is_skipped() {
        let broker = InMemoryBroker::new();
        let payments = InMemoryPaymentGateway::new();
        let stage = stage(&broker, &payments);
        let record = reserved_order(&broker).await;

        stage.handle(&record).await.unwrap();
        let events = broker.record_count(topic::ORDER_EVENTS).await;
        stage.handle(&record).await.unwrap();

        assert_eq!(payments.attempts(), 1);
        assert_eq!(broker.record_count(topic::ORDER_EVENTS).await, events);
    }
}
