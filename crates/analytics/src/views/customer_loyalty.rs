//! Customers with repeated orders.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use broker::topic;
use chrono::{DateTime, Utc};
use domain::CustomerId;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::Result;
use crate::aggregation::{Aggregation, AggregationPosition, StreamInput};
use crate::output::AnalyticsRecord;
use crate::read_model::ReadModel;

pub const CUSTOMER_LOYALTY: &str = "customer-loyalty";

/// Order count from which a customer counts as loyal.
pub const LOYALTY_THRESHOLD: u64 = 3;

#[derive(Debug, Default, Serialize, Deserialize)]
struct State {
    position: AggregationPosition,
    orders: BTreeMap<CustomerId, u64>,
}

/// Unwindowed order count per customer. Every order of a loyal customer
/// produces a new signal.
#[derive(Clone, Default)]
pub struct CustomerLoyaltyView {
    state: Arc<RwLock<State>>,
}

impl CustomerLoyaltyView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn order_count(&self, customer_id: &CustomerId) -> u64 {
        self.state
            .read()
            .await
            .orders
            .get(customer_id)
            .copied()
            .unwrap_or(0)
    }

    /// Customers at or above the threshold, with their order count.
    pub async fn loyal_customers(&self) -> Vec<(CustomerId, u64)> {
        self.state
            .read()
            .await
            .orders
            .iter()
            .filter(|(_, count)| **count >= LOYALTY_THRESHOLD)
            .map(|(id, count)| (id.clone(), *count))
            .collect()
    }
}

#[async_trait]
impl Aggregation for CustomerLoyaltyView {
    fn name(&self) -> &'static str {
        CUSTOMER_LOYALTY
    }

    fn source_topic(&self) -> &'static str {
        topic::ORDER_CREATED
    }

    async fn handle(
        &self,
        input: &StreamInput,
        _timestamp: DateTime<Utc>,
    ) -> Result<Vec<AnalyticsRecord>> {
        let StreamInput::OrderCreated(order) = input else {
            return Ok(Vec::new());
        };

        let mut state = self.state.write().await;
        state.position = state.position.advance();
        let count = state.orders.entry(order.customer_id.clone()).or_default();
        *count += 1;
        if *count < LOYALTY_THRESHOLD {
            return Ok(Vec::new());
        }
        Ok(vec![AnalyticsRecord::LoyalCustomer {
            customer_id: order.customer_id.clone(),
            order_count: *count,
        }])
    }

    async fn position(&self) -> AggregationPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        *self.state.write().await = State::default();
        Ok(())
    }

    async fn snapshot(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(&*self.state.read().await)?)
    }

    async fn restore(&self, value: serde_json::Value) -> Result<()> {
        *self.state.write().await = serde_json::from_value(value)?;
        Ok(())
    }
}

impl ReadModel for CustomerLoyaltyView {
    fn name(&self) -> &'static str {
        CUSTOMER_LOYALTY
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.orders.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Money, Order, OrderItem};

    fn order_from(customer: &str) -> StreamInput {
        StreamInput::OrderCreated(
            Order::builder()
                .customer(customer, "Grace Hopper", "grace@example.com")
                .item(OrderItem::new("P-1", "Widget", 1, Money::from_dollars(10)))
                .build(),
        )
    }

    #[tokio::test]
    async fn third_order_triggers_and_every_later_one_again() {
        let view = CustomerLoyaltyView::new();
        let mut signals = Vec::new();
        for _ in 0..4 {
            signals.push(view.handle(&order_from("CUST-9"), Utc::now()).await.unwrap());
        }

        assert!(signals[0].is_empty());
        assert!(signals[1].is_empty());
        assert_eq!(
            signals[2],
            vec![AnalyticsRecord::LoyalCustomer {
                customer_id: CustomerId::from("CUST-9"),
                order_count: 3,
            }]
        );
        assert!(matches!(
            signals[3][..],
            [AnalyticsRecord::LoyalCustomer { order_count: 4, .. }]
        ));
    }

    #[tokio::test]
    async fn customers_are_counted_separately() {
        let view = CustomerLoyaltyView::new();
        for customer in ["CUST-1", "CUST-2", "CUST-1"] {
            view.handle(&order_from(customer), Utc::now()).await.unwrap();
        }
        assert_eq!(view.order_count(&CustomerId::from("CUST-1")).await, 2);
        assert_eq!(view.order_count(&CustomerId::from("CUST-2")).await, 1);
        assert!(view.loyal_customers().await.is_empty());
        assert_eq!(ReadModel::count(&view), 2);
    }

    #[tokio::test]
    async fn snapshot_keeps_counts() {
        let view = CustomerLoyaltyView::new();
        view.handle(&order_from("CUST-3"), Utc::now()).await.unwrap();
        view.handle(&order_from("CUST-3"), Utc::now()).await.unwrap();

        let restored = CustomerLoyaltyView::new();
        restored.restore(view.snapshot().await.unwrap()).await.unwrap();
        let out = restored.handle(&order_from("CUST-3"), Utc::now()).await.unwrap();
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn punctuation_emits_nothing_for_unwindowed_view() {
        let view = CustomerLoyaltyView::new();
        for _ in 0..3 {
            view.handle(&order_from("CUST-4"), Utc::now()).await.unwrap();
        }
        assert!(view.punctuate(Utc::now()).await.is_empty());
    }
}
