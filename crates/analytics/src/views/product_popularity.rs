//! Products ordered repeatedly within fifteen minutes.

use std::sync::Arc;

use async_trait::async_trait;
use broker::topic;
use chrono::{DateTime, Utc};
use domain::ProductId;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::Result;
use crate::aggregation::{Aggregation, AggregationPosition, StreamInput};
use crate::output::AnalyticsRecord;
use crate::read_model::ReadModel;
use crate::window::{ClosedWindow, TumblingWindow, WindowedSnapshot, WindowedState};

pub const PRODUCT_POPULARITY: &str = "product-popularity";

/// Minimum occurrences in a window for a product to be reported.
pub const POPULARITY_THRESHOLD: u64 = 3;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    position: AggregationPosition,
    windows: WindowedSnapshot<ProductId, u64>,
}

struct State {
    windows: WindowedState<ProductId, u64>,
    position: AggregationPosition,
}

/// Counts order lines per product. Quantities are ignored: an order with
/// two lines of the same product counts twice, a line of ten units once.
#[derive(Clone)]
pub struct ProductPopularityView {
    state: Arc<RwLock<State>>,
    size: TumblingWindow,
}

impl ProductPopularityView {
    pub fn new() -> Self {
        Self::with_window(TumblingWindow::of_minutes(15))
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

    /// Occurrences in the open windows, most popular first.
    pub async fn trending(&self) -> Vec<(ProductId, u64)> {
        let state = self.state.read().await;
        let mut counts: Vec<_> = state
            .windows
            .open_windows()
            .into_iter()
            .flat_map(|w| w.values)
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts
    }

    fn records(closed: Vec<ClosedWindow<ProductId, u64>>) -> Vec<AnalyticsRecord> {
        closed
            .into_iter()
            .flat_map(|c| {
                c.values
                    .into_iter()
                    .filter(|(_, count)| *count >= POPULARITY_THRESHOLD)
                    .map(move |(product_id, count)| AnalyticsRecord::PopularProduct {
                        product_id: product_id.as_str().to_string(),
                        count,
                        window_start: c.window.start,
                        window_end: c.window.end,
                    })
            })
            .collect()
    }
}

impl Default for ProductPopularityView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Aggregation for ProductPopularityView {
    fn name(&self) -> &'static str {
        PRODUCT_POPULARITY
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
        let mut late = false;
        for item in &order.items {
            late |= state
                .windows
                .update(item.product_id.clone(), timestamp, |count| *count += 1)
                .is_none();
        }
        state.position = if late {
            metrics::counter!("analytics_late_records_total", "aggregation" => PRODUCT_POPULARITY)
                .increment(1);
            tracing::debug!(order_id = %order.order_id, %timestamp, "late order dropped from popularity");
            state.position.late()
        } else {
            state.position.advance()
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

impl ReadModel for ProductPopularityView {
    fn name(&self) -> &'static str {
        PRODUCT_POPULARITY
    }

    fn count(&self) -> usize {
        self.state
            .try_read()
            .map(|s| s.windows.open_windows().iter().map(|w| w.values.len()).sum())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use domain::{Money, Order, OrderItem};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, minute, 0).unwrap()
    }

    fn order(products: &[&str]) -> StreamInput {
        StreamInput::OrderCreated(
            Order::builder()
                .items(
                    products
                        .iter()
                        .map(|p| OrderItem::new(*p, "Thing", 10, Money::from_dollars(1))),
                )
                .build(),
        )
    }

    #[tokio::test]
    async fn reports_products_reaching_threshold() {
        let view = ProductPopularityView::new();
        view.handle(&order(&["A", "B"]), at(1)).await.unwrap();
        view.handle(&order(&["A"]), at(5)).await.unwrap();
        view.handle(&order(&["A", "B"]), at(14)).await.unwrap();

        assert_eq!(
            view.trending().await,
            vec![(ProductId::from("A"), 3), (ProductId::from("B"), 2)]
        );

        let out = view.punctuate(at(15)).await;
        assert_eq!(
            out,
            vec![AnalyticsRecord::PopularProduct {
                product_id: "A".into(),
                count: 3,
                window_start: at(0),
                window_end: at(15),
            }]
        );
    }

    #[tokio::test]
    async fn repeated_lines_count_separately() {
        let view = ProductPopularityView::new();
        view.handle(&order(&["C", "C", "C"]), at(2)).await.unwrap();
        let out = view.punctuate(at(20)).await;
        assert!(matches!(out[..], [AnalyticsRecord::PopularProduct { count: 3, .. }]));
    }

    #[tokio::test]
    async fn late_orders_are_skipped() {
        let view = ProductPopularityView::new();
        view.punctuate(at(30)).await;
        view.handle(&order(&["A", "A", "A"]), at(1)).await.unwrap();
        assert!(view.trending().await.is_empty());
        assert_eq!(view.position().await.late_records, 1);
    }
}
