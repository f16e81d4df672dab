use criterion::{Criterion, criterion_group, criterion_main};
use event_store::{EventStore, Identifier, InMemoryEventStore, NewEvent, Version};

fn make_event(root_id: &Identifier, version: i64) -> NewEvent {
    NewEvent::builder()
        .root_id(root_id.clone())
        .root_aggregate_type("Car")
        .event_type("ManufacturerChanged")
        .version(Version::new(version))
        .data_raw(serde_json::json!({
            "year": 2024,
            "make": "Toyota",
            "model": "Corolla"
        }))
        .build()
}

fn bench_add_single_event(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_store/add_single_event", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryEventStore::new();
                let id = Identifier::new();
                store
                    .add_events("Car", id.as_str(), vec![make_event(&id, 1)])
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_add_batch_10(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_store/add_batch_10", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryEventStore::new();
                let id = Identifier::new();
                let events: Vec<NewEvent> = (1..=10).map(|v| make_event(&id, v)).collect();
                store.add_events("Car", id.as_str(), events).await.unwrap();
            });
        });
    });
}

fn bench_get_event_stream(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let id = Identifier::new();

    // Pre-populate with 100 events
    rt.block_on(async {
        let events: Vec<NewEvent> = (1..=100).map(|v| make_event(&id, v)).collect();
        store.add_events("Car", id.as_str(), events).await.unwrap();
    });

    c.bench_function("event_store/get_event_stream_100", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.get_event_stream("Car", id.as_str()).await.unwrap();
            });
        });
    });
}

fn bench_stream_all_events(c: &mut Criterion) {
    use futures_util::StreamExt;

    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();

    // Pre-populate with 1000 events across 10 streams
    rt.block_on(async {
        for _ in 0..10 {
            let id = Identifier::new();
            let events: Vec<NewEvent> = (1..=100).map(|v| make_event(&id, v)).collect();
            store.add_events("Car", id.as_str(), events).await.unwrap();
        }
    });

    c.bench_function("event_store/stream_1000_events", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut stream = store.stream_all_events().await.unwrap();
                let mut count = 0;
                while let Some(result) = stream.next().await {
                    result.unwrap();
                    count += 1;
                }
                assert_eq!(count, 1000);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_add_single_event,
    bench_add_batch_10,
    bench_get_event_stream,
    bench_stream_all_events,
);
criterion_main!(benches);
