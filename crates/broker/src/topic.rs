//! Static topic table.
//!
//! Topics are provisioned from this table when a broker is created; the
//! broker never creates a topic on first use.

pub const ORDER_CREATED: &str = "order.created";
pub const ORDER_VALIDATED: &str = "order.validated";
pub const ORDER_INVENTORY: &str = "order.inventory";
pub const ORDER_PAYMENT: &str = "order.payment";
pub const ORDER_SHIPPED: &str = "order.shipped";
pub const ORDER_EVENTS: &str = "order.events";
pub const ORDER_NOTIFICATIONS: &str = "order.notifications";
pub const ORDER_ANALYTICS: &str = "order.analytics";
pub const ORDER_DEAD_LETTER: &str = "order.dead-letter";
/// Provisioned but nothing publishes to it; retries happen in the consumer.
pub const ORDER_RETRY: &str = "order.retry";

/// Name and partition count of a provisioned topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicSpec {
    pub name: &'static str,
    pub partitions: u32,
}

impl TopicSpec {
    pub const fn new(name: &'static str, partitions: u32) -> Self {
        Self { name, partitions }
    }
}

/// Every topic of the fulfillment system.
pub const TOPICS: &[TopicSpec] = &[
    TopicSpec::new(ORDER_CREATED, 5),
    TopicSpec::new(ORDER_VALIDATED, 5),
    TopicSpec::new(ORDER_INVENTORY, 5),
    TopicSpec::new(ORDER_PAYMENT, 3),
    TopicSpec::new(ORDER_SHIPPED, 3),
    TopicSpec::new(ORDER_EVENTS, 5),
    TopicSpec::new(ORDER_NOTIFICATIONS, 3),
    TopicSpec::new(ORDER_ANALYTICS, 3),
    TopicSpec::new(ORDER_DEAD_LETTER, 1),
    TopicSpec::new(ORDER_RETRY, 3),
];

/// Looks up a topic in [`TOPICS`].
pub fn find(name: &str) -> Option<TopicSpec> {
    TOPICS.iter().copied().find(|t| t.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_table_partition_counts() {
        assert_eq!(find(ORDER_CREATED).unwrap().partitions, 5);
        assert_eq!(find(ORDER_PAYMENT).unwrap().partitions, 3);
        assert_eq!(find(ORDER_DEAD_LETTER).unwrap().partitions, 1);
        assert!(find("order.unknown").is_none());
    }

    #[test]
    fn topic_names_are_unique() {
        let mut names: Vec<_> = TOPICS.iter().map(|t| t.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), TOPICS.len());
    }
}
