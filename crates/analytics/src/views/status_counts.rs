//! Transitions into each status per five-minute window.

use std::sync::Arc;

use async_trait::async_trait;
use broker::topic;
use chrono::{DateTime, Utc};
use domain::OrderStatus;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::Result;
use crate::aggregation::{Aggregation, AggregationPosition, StreamInput};
use crate::output::AnalyticsRecord;
use crate::read_model::ReadModel;
use crate::window::{ClosedWindow, TumblingWindow, WindowedSnapshot, WindowedState};

pub const STATUS_COUNTS: &str = "status-counts";

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    position: AggregationPosition,
    windows: WindowedSnapshot<OrderStatus, u64>,
}

struct State {
    windows: WindowedState<OrderStatus, u64>,
    position: AggregationPosition,
}

/// Counts `order.events` by their new status in tumbling windows.
#[derive(Clone)]
pub struct StatusCountsView {
    state: Arc<RwLock<State>>,
    size: TumblingWindow,
}

impl StatusCountsView {
    pub fn new() -> Self {
        Self::with_window(TumblingWindow::of_minutes(5))
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

    /// Counts of the windows that have not closed yet.
    pub async fn open_windows(&self) -> Vec<ClosedWindow<OrderStatus, u64>> {
        self.state.read().await.windows.open_windows()
    }

    fn records(closed: Vec<ClosedWindow<OrderStatus, u64>>) -> Vec<AnalyticsRecord> {
        closed
            .into_iter()
            .flat_map(|c| {
                c.values
                    .into_iter()
                    .map(move |(status, count)| AnalyticsRecord::StatusCount {
                        status,
                        count,
                        window_start: c.window.start,
                        window_end: c.window.end,
                    })
            })
            .collect()
    }
}

impl Default for StatusCountsView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Aggregation for StatusCountsView {
    fn name(&self) -> &'static str {
        STATUS_COUNTS
    }

    fn source_topic(&self) -> &'static str {
        topic::ORDER_EVENTS
    }

    async fn handle(
        &self,
        input: &StreamInput,
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<AnalyticsRecord>> {
        let StreamInput::Lifecycle(event) = input else {
            return Ok(Vec::new());
        };

        let mut state = self.state.write().await;
        let accepted = state
            .windows
            .update(event.new_status, timestamp, |count| *count += 1);
        state.position = match accepted {
            Some(_) => state.position.advance(),
            None => {
                metrics::counter!("analytics_late_records_total", "aggregation" => STATUS_COUNTS)
                    .increment(1);
                tracing::debug!(order_id = %event.order_id, %timestamp, "late status event dropped");
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

impl ReadModel for StatusCountsView {
    fn name(&self) -> &'static str {
        STATUS_COUNTS
    }

    fn count(&self) -> usize {
        self.state
            .try_read()
            .map(|s| s.windows.open_windows().iter().map(|w| w.values.len()).sum())
            .unwrap_or(0)
    }
}
