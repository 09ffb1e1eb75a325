//! Records published on `order.analytics`.

use chrono::{DateTime, Utc};
use common::OrderId;
use domain::{CustomerId, Money, OrderStatus};
use serde::{Deserialize, Serialize};

/// Partition key of every revenue record.
pub const REVENUE_KEY: &str = "REVENUE";

/// One aggregation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum AnalyticsRecord {
    /// Number of transitions into `status` within a window.
    StatusCount {
        status: OrderStatus,
        count: u64,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    },
    HighValueOrder {
        order_id: OrderId,
        amount: Money,
        customer: String,
        customer_id: CustomerId,
    },
    TotalRevenue {
        amount: Money,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    },
    LoyalCustomer {
        customer_id: CustomerId,
        order_count: u64,
    },
    PopularProduct {
        product_id: String,
        count: u64,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    },
}

impl AnalyticsRecord {
    /// Partition key the record is published under.
    pub fn key(&self) -> String {
        match self {
            AnalyticsRecord::StatusCount { status, .. } => status.as_str().to_string(),
            AnalyticsRecord::HighValueOrder { order_id, .. } => order_id.to_string(),
            AnalyticsRecord::TotalRevenue { .. } => REVENUE_KEY.to_string(),
            AnalyticsRecord::LoyalCustomer { customer_id, .. } => customer_id.as_str().to_string(),
            AnalyticsRecord::PopularProduct { product_id, .. } => product_id.clone(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            AnalyticsRecord::StatusCount { .. } => "STATUS_COUNT",
            AnalyticsRecord::HighValueOrder { .. } => "HIGH_VALUE_ORDER",
            AnalyticsRecord::TotalRevenue { .. } => "TOTAL_REVENUE",
            AnalyticsRecord::LoyalCustomer { .. } => "LOYAL_CUSTOMER",
            AnalyticsRecord::PopularProduct { .. } => "POPULAR_PRODUCT",
        }
    }
}
