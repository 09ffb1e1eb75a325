//! Alerts for orders above a fixed amount.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use broker::topic;
use chrono::{DateTime, Utc};
use domain::Money;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::Result;
use crate::aggregation::{Aggregation, AggregationPosition, StreamInput};
use crate::output::AnalyticsRecord;
use crate::read_model::ReadModel;

pub const HIGH_VALUE_ORDERS: &str = "high-value-orders";

/// Orders strictly above this total raise an alert.
pub const HIGH_VALUE_THRESHOLD: Money = Money::from_dollars(1000);

const RECENT_ALERTS: usize = 100;

#[derive(Debug, Default, Serialize, Deserialize)]
struct State {
    position: AggregationPosition,
    recent: VecDeque<AnalyticsRecord>,
}

/// Stateless filter over `order.created`. Keeps the latest alerts for queries.
#[derive(Clone, Default)]
pub struct HighValueView {
    state: Arc<RwLock<State>>,
}

impl HighValueView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent alerts, newest first.
    pub async fn recent_alerts(&self) -> Vec<AnalyticsRecord> {
        self.state.read().await.recent.iter().rev().cloned().collect()
    }
}

#[async_trait]
impl Aggregation for HighValueView {
    fn name(&self) -> &'static str {
        HIGH_VALUE_ORDERS
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
        if order.total_amount <= HIGH_VALUE_THRESHOLD {
            return Ok(Vec::new());
        }

        tracing::info!(order_id = %order.order_id, amount = %order.total_amount, "high value order");
        let alert = AnalyticsRecord::HighValueOrder {
            order_id: order.order_id.clone(),
            amount: order.total_amount,
            customer: order.customer_name.clone(),
            customer_id: order.customer_id.clone(),
        };
        if state.recent.len() == RECENT_ALERTS {
            state.recent.pop_front();
        }
        state.recent.push_back(alert.clone());
        Ok(vec![alert])
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

impl ReadModel for HighValueView {
    fn name(&self) -> &'static str {
        HIGH_VALUE_ORDERS
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.recent.len()).unwrap_or(0)
    }
}
