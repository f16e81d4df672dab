use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    CarService, ChangeOwnership, CreateCar, EventSourcingRepository, RegisterCar, SetManufacturer,
    car_migrator,
};
use event_store::InMemoryEventStore;
use projections::{CarProjection, InMemoryQueryStore, ReadModelProjector};

/// Populate a store with N cars, each having 4 events.
async fn populate_store(store: &InMemoryEventStore, n: usize) {
    let repository = EventSourcingRepository::new(store.clone());
    let service = CarService::new(repository);
    for i in 0..n {
        let cmd = CreateCar::for_organization("org_bench");
        let car_id = cmd.car_id.clone();
        service.create_car(cmd).await.unwrap();
        service
            .set_manufacturer(SetManufacturer::new(car_id.clone(), 2020, "Mazda", "MX-5"))
            .await
            .unwrap();
        service
            .change_ownership(ChangeOwnership::new(car_id.clone(), "user_bench"))
            .await
            .unwrap();
        service
            .register_car(RegisterCar::new(car_id, "NZ", "Auckland", format!("B{i}")))
            .await
            .unwrap();
    }
}

fn bench_rebuild(c: &mut Criterion, cars: usize) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    rt.block_on(populate_store(&store, cars));

    let migrator = Arc::new(car_migrator().unwrap());
    let view = Arc::new(CarProjection::new(InMemoryQueryStore::new(), migrator));
    let projector = ReadModelProjector::new(store).with_projection(view);

    c.bench_function(&format!("projections/rebuild_{}_events", cars * 4), |b| {
        b.iter(|| {
            rt.block_on(async {
                projector.rebuild_all().await.unwrap();
            });
        });
    });
}

fn bench_rebuild_100_cars(c: &mut Criterion) {
    bench_rebuild(c, 100);
}

fn bench_rebuild_1000_cars(c: &mut Criterion) {
    bench_rebuild(c, 1000);
}

criterion_group!(benches, bench_rebuild_100_cars, bench_rebuild_1000_cars);
criterion_main!(benches);
