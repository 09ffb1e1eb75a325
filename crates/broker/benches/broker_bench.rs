use broker::{BrokerExt, InMemoryBroker, MessageBroker, Offset, ProducerRecord, topic};
use criterion::{Criterion, criterion_group, criterion_main};

fn make_record(key: &str) -> ProducerRecord {
    ProducerRecord::builder()
        .topic(topic::ORDER_EVENTS)
        .key(key)
        .header("event-type", "ORDER_VALIDATED")
        .payload_raw(serde_json::json!({
            "eventId": "00000000-0000-0000-0000-000000000001",
            "orderId": key,
            "eventType": "ORDER_VALIDATED",
            "previousStatus": "CONFIRMED",
            "newStatus": "VALIDATED"
        }))
        .build()
}

fn bench_publish_single(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let broker = InMemoryBroker::new();

    c.bench_function("broker/publish_single", |b| {
        b.iter(|| {
            rt.block_on(async {
                broker.publish(make_record("order-1")).await.unwrap();
            });
        });
    });
}

fn bench_publish_many_keys(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let keys: Vec<String> = (0..100).map(|i| format!("order-{i}")).collect();

    c.bench_function("broker/publish_100_keys", |b| {
        b.iter(|| {
            rt.block_on(async {
                let broker = InMemoryBroker::new();
                for key in &keys {
                    broker.publish(make_record(key)).await.unwrap();
                }
            });
        });
    });
}

fn bench_poll_and_commit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let broker = InMemoryBroker::new();
    let partition = rt.block_on(async {
        let mut partition = 0;
        for _ in 0..1000 {
            partition = broker.publish(make_record("order-1")).await.unwrap().partition;
        }
        partition
    });

    c.bench_function("broker/poll_100_and_commit", |b| {
        b.iter(|| {
            rt.block_on(async {
                broker
                    .commit("bench-group", topic::ORDER_EVENTS, partition, Offset::initial())
                    .await
                    .unwrap();
                let records = broker
                    .poll("bench-group", topic::ORDER_EVENTS, partition, 100)
                    .await
                    .unwrap();
                let next = records.last().unwrap().offset.next();
                broker
                    .commit("bench-group", topic::ORDER_EVENTS, partition, next)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_partitioner(c: &mut Criterion) {
    let keys: Vec<String> = (0..1000)
        .map(|_| uuid_like())
        .collect();

    c.bench_function("broker/partition_for_key_1000", |b| {
        b.iter(|| {
            keys.iter()
                .map(|k| broker::partition_for_key(k, 5))
                .sum::<u32>()
        });
    });
}

fn uuid_like() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:08x}-0000-4000-8000-{:012x}", n, n * 7919)
}

criterion_group!(
    benches,
    bench_publish_single,
    bench_publish_many_keys,
    bench_poll_and_commit,
    bench_partitioner,
);
criterion_main!(benches);
