use criterion::{Criterion, criterion_group, criterion_main};
use domain::{Address, Money, Order, OrderItem, validate};

fn make_order(items: usize) -> Order {
    Order::builder()
        .customer("CUST-BENCH", "Bench Customer", "bench@example.com")
        .items((0..items).map(|i| {
            OrderItem::new(
                format!("SKU-{i:04}"),
                "Benchmark Widget",
                (i % 5 + 1) as u32,
                Money::from_cents(1999),
            )
        }))
        .shipping_address(Address::new("1 Bench St", "Springfield", "IL", "62701", "USA"))
        .build()
}

fn bench_build_order(c: &mut Criterion) {
    c.bench_function("domain/build_order_10_items", |b| {
        b.iter(|| make_order(10));
    });
}

fn bench_validate(c: &mut Criterion) {
    let order = make_order(50);

    c.bench_function("domain/validate_50_items", |b| {
        b.iter(|| validate(&order).unwrap());
    });
}

fn bench_order_json(c: &mut Criterion) {
    let order = make_order(10);
    let json = serde_json::to_value(&order).unwrap();

    c.bench_function("domain/serialize_order", |b| {
        b.iter(|| serde_json::to_value(&order).unwrap());
    });

    c.bench_function("domain/deserialize_order", |b| {
        b.iter(|| serde_json::from_value::<Order>(json.clone()).unwrap());
    });
}

fn bench_money_parse(c: &mut Criterion) {
    c.bench_function("domain/money_parse", |b| {
        b.iter(|| "12345.67".parse::<Money>().unwrap());
    });
}

criterion_group!(
    benches,
    bench_build_order,
    bench_validate,
    bench_order_json,
    bench_money_parse,
);
criterion_main!(benches);
