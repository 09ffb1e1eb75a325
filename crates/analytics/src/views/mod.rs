//! The aggregations of the analytics engine.

pub mod customer_loyalty;
pub mod high_value;
pub mod product_popularity;
pub mod revenue;
pub mod status_counts;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use domain::Money;
use serde::Serialize;

pub use customer_loyalty::CustomerLoyaltyView;
pub use high_value::HighValueView;
pub use product_popularity::ProductPopularityView;
pub use revenue::RevenueView;
pub use status_counts::StatusCountsView;

use crate::aggregation::Aggregation;
use crate::output::AnalyticsRecord;

/// Handles to the five order aggregations. Clones share state.
#[derive(Clone, Default)]
pub struct OrderAnalytics {
    pub status_counts: StatusCountsView,
    pub high_value: HighValueView,
    pub revenue: RevenueView,
    pub loyalty: CustomerLoyaltyView,
    pub popularity: ProductPopularityView,
}

/// Point-in-time view of the open windows and unwindowed state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub status_counts: BTreeMap<String, u64>,
    pub revenue_window_start: Option<DateTime<Utc>>,
    pub revenue: Money,
    pub high_value_orders: Vec<AnalyticsRecord>,
    pub loyal_customers: BTreeMap<String, u64>,
    pub trending_products: Vec<(String, u64)>,
}

impl OrderAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    /// The views in registration order.
    pub fn aggregations(&self) -> Vec<Arc<dyn Aggregation>> {
        vec![
            Arc::new(self.status_counts.clone()),
            Arc::new(self.high_value.clone()),
            Arc::new(self.revenue.clone()),
            Arc::new(self.loyalty.clone()),
            Arc::new(self.popularity.clone()),
        ]
    }

    pub async fn summary(&self) -> AnalyticsSummary {
        let mut status_counts = BTreeMap::new();
        for window in self.status_counts.open_windows().await {
            for (status, count) in window.values {
                *status_counts.entry(status.as_str().to_string()).or_default() += count;
            }
        }
        let (revenue_window_start, revenue) = match self.revenue.current().await {
            Some((start, amount)) => (Some(start), amount),
            None => (None, Money::zero()),
        };

        AnalyticsSummary {
            status_counts,
            revenue_window_start,
            revenue,
            high_value_orders: self.high_value.recent_alerts().await,
            loyal_customers: self
                .loyalty
                .loyal_customers()
                .await
                .into_iter()
                .map(|(id, count)| (id.to_string(), count))
                .collect(),
            trending_products: self
                .popularity
                .trending()
                .await
                .into_iter()
                .map(|(id, count)| (id.to_string(), count))
                .collect(),
        }
    }
}
