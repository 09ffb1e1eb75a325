//! Integration tests: records on the broker → AnalyticsEngine → order.analytics.

use std::sync::Arc;
use std::time::Duration;

use analytics::{
    AnalyticsRecord, ENGINE_NAME, EngineSchedule, OrderAnalytics, order_analytics_engine,
};
use broker::{
    BrokerExt, InMemoryBroker, MessageBroker, ProducerRecord, partition_for_key, topic,
};
use chrono::{DateTime, TimeZone, Utc};
use common::ManualClock;
use domain::{Money, Order, OrderEvent, OrderId, OrderItem, OrderStatus, event_types};

fn at(minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 20, 14, minute, second).unwrap()
}

async fn publish_created(broker: &InMemoryBroker, order: &Order, timestamp: DateTime<Utc>) {
    broker
        .publish(
            ProducerRecord::builder()
                .topic(topic::ORDER_CREATED)
                .key(order.order_id.as_str())
                .timestamp(timestamp)
                .payload(order)
                .unwrap()
                .build(),
        )
        .await
        .unwrap();
}

async fn publish_validated(broker: &InMemoryBroker, timestamp: DateTime<Utc>) {
    publish_validated_for(broker, OrderId::new(), timestamp).await;
}

async fn publish_validated_for(broker: &InMemoryBroker, order_id: OrderId, timestamp: DateTime<Utc>) {
    let event = OrderEvent::transition(
        order_id,
        event_types::ORDER_VALIDATED,
        OrderStatus::Confirmed,
        OrderStatus::Validated,
        "ValidationStage",
        timestamp,
    )
    .unwrap();
    broker
        .publish(
            ProducerRecord::builder()
                .topic(topic::ORDER_EVENTS)
                .key(event.order_id.as_str())
                .timestamp(timestamp)
                .payload(&event)
                .unwrap()
                .build(),
        )
        .await
        .unwrap();
}

fn order(customer: &str, products: &[&str], dollars: i64) -> Order {
    Order::builder()
        .customer(customer, "Edsger Dijkstra", "edsger@example.com")
        .items(
            products
                .iter()
                .map(|p| OrderItem::new(*p, "Thing", 1, Money::from_dollars(dollars))),
        )
        .tax_amount(Money::zero())
        .shipping_cost(Money::zero())
        .build()
}

async fn outputs(broker: &InMemoryBroker) -> Vec<AnalyticsRecord> {
    broker
        .read_topic(topic::ORDER_ANALYTICS)
        .await
        .unwrap()
        .iter()
        .map(|r| r.decode().unwrap())
        .collect()
}

#[tokio::test]
async fn test_status_window_emits_once_with_full_count() {
    let broker = InMemoryBroker::new();
    let clock = ManualClock::new(at(0, 0));
    let analytics = OrderAnalytics::new();
    let engine = order_analytics_engine(broker.clone(), Arc::new(clock.clone()), &analytics);

    for second in [5, 17, 33, 48] {
        publish_validated(&broker, at(2, second)).await;
    }
    engine.run_catch_up().await.unwrap();
    assert!(outputs(&broker).await.is_empty());

    clock.set(at(5, 0));
    engine.punctuate().await.unwrap();
    clock.set(at(10, 0));
    engine.punctuate().await.unwrap();

    let records = outputs(&broker).await;
    assert_eq!(
        records,
        vec![AnalyticsRecord::StatusCount {
            status: OrderStatus::Validated,
            count: 4,
            window_start: at(0, 0),
            window_end: at(5, 0),
        }]
    );
    let raw = broker.read_topic(topic::ORDER_ANALYTICS).await.unwrap();
    assert_eq!(raw[0].key.as_deref(), Some("VALIDATED"));
}

/// First generated order id whose key lands on `partition` of `order.events`.
async fn order_id_on(broker: &InMemoryBroker, partition: u32) -> OrderId {
    let partitions = broker.partition_count(topic::ORDER_EVENTS).await.unwrap();
    loop {
        let id = OrderId::new();
        if partition_for_key(id.as_str(), partitions) == partition {
            return id;
        }
    }
}

#[tokio::test]
async fn test_windows_span_partitions_in_event_time() {
    let broker = InMemoryBroker::new();
    let clock = ManualClock::new(at(0, 0));
    let analytics = OrderAnalytics::new();
    let engine = order_analytics_engine(broker.clone(), Arc::new(clock.clone()), &analytics);

    // The later event sits on the lower partition.
    publish_validated_for(&broker, order_id_on(&broker, 0).await, at(7, 0)).await;
    publish_validated_for(&broker, order_id_on(&broker, 1).await, at(2, 0)).await;
    publish_validated_for(&broker, order_id_on(&broker, 1).await, at(3, 0)).await;

    assert_eq!(engine.run_catch_up().await.unwrap(), 3);
    clock.set(at(30, 0));
    engine.punctuate().await.unwrap();

    assert_eq!(
        outputs(&broker).await,
        vec![
            AnalyticsRecord::StatusCount {
                status: OrderStatus::Validated,
                count: 2,
                window_start: at(0, 0),
                window_end: at(5, 0),
            },
            AnalyticsRecord::StatusCount {
                status: OrderStatus::Validated,
                count: 1,
                window_start: at(5, 0),
                window_end: at(10, 0),
            },
        ]
    );
}

#[tokio::test]
async fn test_created_orders_feed_every_view() {
    let broker = InMemoryBroker::new();
    let clock = ManualClock::new(at(0, 0));
    let analytics = OrderAnalytics::new();
    let engine = order_analytics_engine(broker.clone(), Arc::new(clock.clone()), &analytics);

    publish_created(&broker, &order("CUST-1", &["A"], 50), at(1, 0)).await;
    publish_created(&broker, &order("CUST-1", &["A", "B"], 600), at(2, 0)).await;
    publish_created(&broker, &order("CUST-1", &["A"], 30), at(3, 0)).await;
    engine.run_catch_up().await.unwrap();

    let records = outputs(&broker).await;
    assert_eq!(
        records
            .iter()
            .filter(|r| matches!(r, AnalyticsRecord::HighValueOrder { .. }))
            .count(),
        1
    );
    assert!(records.contains(&AnalyticsRecord::LoyalCustomer {
        customer_id: "CUST-1".into(),
        order_count: 3,
    }));

    clock.set(at(20, 0));
    engine.punctuate().await.unwrap();
    let records = outputs(&broker).await;
    assert!(records.contains(&AnalyticsRecord::TotalRevenue {
        amount: Money::from_dollars(1280),
        window_start: at(0, 0),
        window_end: at(10, 0),
    }));
    assert!(records.contains(&AnalyticsRecord::PopularProduct {
        product_id: "A".into(),
        count: 3,
        window_start: at(0, 0),
        window_end: at(15, 0),
    }));
    assert!(!records.iter().any(|r| matches!(
        r,
        AnalyticsRecord::PopularProduct { product_id, .. } if product_id == "B"
    )));
}

#[tokio::test]
async fn test_restored_engine_continues_counts() {
    let broker = InMemoryBroker::new();
    let clock = ManualClock::new(at(0, 0));

    {
        let analytics = OrderAnalytics::new();
        let engine = order_analytics_engine(broker.clone(), Arc::new(clock.clone()), &analytics);
        publish_created(&broker, &order("CUST-2", &["A"], 10), at(1, 0)).await;
        publish_created(&broker, &order("CUST-2", &["A"], 10), at(1, 30)).await;
        engine.run_catch_up().await.unwrap();
        engine.checkpoint().await.unwrap();
    }

    publish_created(&broker, &order("CUST-2", &["A"], 10), at(2, 0)).await;

    let analytics = OrderAnalytics::new();
    let engine = order_analytics_engine(broker.clone(), Arc::new(clock.clone()), &analytics);
    assert!(engine.restore().await.unwrap());
    assert_eq!(engine.run_catch_up().await.unwrap(), 1);

    assert_eq!(analytics.loyalty.order_count(&"CUST-2".into()).await, 3);
    assert!(outputs(&broker).await.contains(&AnalyticsRecord::LoyalCustomer {
        customer_id: "CUST-2".into(),
        order_count: 3,
    }));
}

#[tokio::test]
async fn test_rebuild_replays_from_the_start() {
    let broker = InMemoryBroker::new();
    let clock = ManualClock::new(at(0, 0));
    let analytics = OrderAnalytics::new();
    let engine = order_analytics_engine(broker.clone(), Arc::new(clock.clone()), &analytics);

    publish_created(&broker, &order("CUST-3", &["A"], 10), at(1, 0)).await;
    publish_created(&broker, &order("CUST-3", &["A"], 10), at(1, 10)).await;
    engine.run_catch_up().await.unwrap();

    assert_eq!(engine.rebuild_all().await.unwrap(), 2);
    assert_eq!(analytics.loyalty.order_count(&"CUST-3".into()).await, 2);
}

#[tokio::test]
async fn test_run_stops_on_shutdown_and_checkpoints() {
    let broker = InMemoryBroker::new();
    let clock = ManualClock::new(at(0, 0));
    let analytics = OrderAnalytics::new();
    let engine = Arc::new(order_analytics_engine(
        broker.clone(),
        Arc::new(clock.clone()),
        &analytics,
    ));

    let (tx, rx) = tokio::sync::watch::channel(false);
    let schedule = EngineSchedule {
        punctuate_every: Duration::from_secs(3600),
        checkpoint_every: Duration::from_secs(3600),
        idle_wait: Duration::from_millis(10),
    };
    let task = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.run(schedule, rx).await }
    });

    publish_created(&broker, &order("CUST-4", &["A"], 10), at(1, 0)).await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while analytics.loyalty.order_count(&"CUST-4".into()).await == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    tx.send(true).unwrap();
    task.await.unwrap().unwrap();
    assert!(broker
        .load_checkpoint(ENGINE_NAME)
        .await
        .unwrap()
        .is_some());
}
