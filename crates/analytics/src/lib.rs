//! Streaming analytics over the order topics.
//!
//! - [`Aggregation`] trait for stateful computations over decoded records
//! - [`WindowedState`] tumbling windows with a watermark and late-record rejection
//! - [`AnalyticsEngine`] reads `order.created` and `order.events`, publishes
//!   to `order.analytics` and checkpoints through the broker
//! - Five views: status counts, high-value alerts, revenue, loyalty, popularity

pub mod aggregation;
pub mod engine;
pub mod error;
pub mod output;
pub mod read_model;
pub mod views;
pub mod window;

pub use aggregation::{Aggregation, AggregationPosition, StreamInput};
pub use engine::{AnalyticsEngine, ENGINE_NAME, EngineSchedule};
pub use error::{AnalyticsError, Result};
pub use output::{AnalyticsRecord, REVENUE_KEY};
pub use read_model::ReadModel;
pub use views::{
    AnalyticsSummary, CustomerLoyaltyView, HighValueView, OrderAnalytics, ProductPopularityView,
    RevenueView, StatusCountsView,
};
pub use window::{ClosedWindow, TumblingWindow, Window, WindowedSnapshot, WindowedState};

use std::sync::Arc;

use broker::MessageBroker;
use common::Clock;

/// Creates an engine with every view of `analytics` registered.
pub fn order_analytics_engine<B: MessageBroker>(
    broker: B,
    clock: Arc<dyn Clock>,
    analytics: &OrderAnalytics,
) -> AnalyticsEngine<B> {
    let mut engine = AnalyticsEngine::new(broker, clock);
    for aggregation in analytics.aggregations() {
        engine.register(aggregation);
    }
    engine
}
