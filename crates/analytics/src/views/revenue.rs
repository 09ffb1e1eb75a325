//! Revenue of created orders per ten-minute window.

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
use crate::window::{ClosedWindow, TumblingWindow, WindowedSnapshot, WindowedState};

pub const TOTAL_REVENUE: &str = "total-revenue";

/// Grouping key; every order falls under it.
const ALL_ORDERS: &str = "TOTAL_REVENUE";

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    position: AggregationPosition,
    windows: WindowedSnapshot<String, Money>,
}

struct State {
    windows: WindowedState<String, Money>,
    position: AggregationPosition,
}

/// Sums `totalAmount` of every created order in tumbling windows.
#[derive(Clone)]
pub struct RevenueView {
    state: Arc<RwLock<State>>,
    size: TumblingWindow,
}

impl RevenueView {
    pub fn new() -> Self {
        Self::with_window(TumblingWindow::of_minutes(10))
    }

    pub fn with_window(size: TumblingWindow) -> Self {
        Self {
            state: Arc::new(RwLock::new(State {
                windows: WindowedState::new(size),
                position: AggregationPosition::zero(),
            })),
            size,
        }
    }

    /// Revenue accumulated in the window that is currently open, if any.
    pub async fn current(&self) -> Option<(DateTime<Utc>, Money)> {
        let state = self.state.read().await;
        state.windows.open_windows().pop().map(|w| {
            let total = w.values.into_iter().map(|(_, amount)| amount).sum();
            (w.window.start, total)
        })
    }

    fn records(closed: Vec<ClosedWindow<String, Money>>) -> Vec<AnalyticsRecord> {
        closed
            .into_iter()
            .flat_map(|c| {
                c.values
                    .into_iter()
                    .map(move |(_, amount)| AnalyticsRecord::TotalRevenue {
                        amount,
                        window_start: c.window.start,
                        window_end: c.window.end,
                    })
            })
            .collect()
    }
}

impl Default for RevenueView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Aggregation for RevenueView {
    fn name(&self) -> &'static str {
        TOTAL_REVENUE
    }

    fn source_topic(&self) -> &'static str {
        topic::ORDER_CREATED
    }

    async fn handle(
        &self,
        input: &StreamInput,
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<AnalyticsRecord>> {
        let StreamInput::OrderCreated(order) = input else {
            return Ok(Vec::new());
        };

        let mut state = self.state.write().await;
        let amount = order.total_amount;
        let accepted = state
            .windows
            .update(ALL_ORDERS.to_string(), timestamp, |sum| *sum += amount);
        state.position = match accepted {
            Some(_) => state.position.advance(),
            None => {
                metrics::counter!("analytics_late_records_total", "aggregation" => TOTAL_REVENUE)
                    .increment(1);
                tracing::debug!(order_id = %order.order_id, %timestamp, "late order dropped from revenue");
                state.position.late()
            }
        };
        Ok(Self::records(state.windows.advance(timestamp)))
    }

    async fn punctuate(&self, now: DateTime<Utc>) -> Vec<AnalyticsRecord> {
        Self::records(self.state.write().await.windows.advance(now))
    }

    async fn position(&self) -> AggregationPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.windows = WindowedState::new(self.size);
        state.position = AggregationPosition::zero();
        Ok(())
    }

    async fn snapshot(&self) -> Result<serde_json::Value> {
        let state = self.state.read().await;
        Ok(serde_json::to_value(Snapshot {
            position: state.position,
            windows: state.windows.snapshot(),
        })?)
    }

    async fn restore(&self, value: serde_json::Value) -> Result<()> {
        let snapshot: Snapshot = serde_json::from_value(value)?;
        let mut state = self.state.write().await;
        state.windows.restore(snapshot.windows);
        state.position = snapshot.position;
        Ok(())
    }
}

impl ReadModel for RevenueView {
    fn name(&self) -> &'static str {
        TOTAL_REVENUE
    }

    fn count(&self) -> usize {
        self.state
            .try_read()
            .map(|s| s.windows.open_windows().len())
            .unwrap_or(0)
    }
}
