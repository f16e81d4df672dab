//! Integration tests: CarService commands → repository observers → view, audits and topic.

use std::sync::Arc;

use domain::{
    CarEvent, CarService, CarStatus, ChangeOwnership, CreateCar, DeleteCar, EventSourcingRepository,
    Identifier, RegisterCar, SetManufacturer, car_migrator,
};
use event_store::{EventStore, InMemoryEventStore, NewEvent, Version};
use messaging::{
    AUDITS_QUEUE, AuditMessage, HandlerError, INTEGRATION_EVENTS_TOPIC, InMemoryMessageBusStore,
    InMemoryQueueStore, IntegrationEventMessage, MessageBusTopicStore, MessageQueueStore,
    QueuedMessage,
};
use projections::{
    CarAuditConsumer, CarIntegrationTranslator, CarProjection, CarReadModel,
    EventNotificationRegistration, EventNotifier, InMemoryQueryStore, QueryStore,
    ReadModelProjector, TopicMessageBroker,
};
use tokio::sync::Mutex;

struct Harness {
    store: InMemoryEventStore,
    service: CarService<InMemoryEventStore>,
    projector: Arc<ReadModelProjector<InMemoryEventStore>>,
    view: Arc<CarProjection<InMemoryQueryStore<CarReadModel>>>,
    bus: InMemoryMessageBusStore<IntegrationEventMessage>,
    audits: InMemoryQueueStore<AuditMessage>,
}

/// Wires a car service with the projector and notifier as observers.
fn setup() -> Harness {
    let store = InMemoryEventStore::new();
    let migrator = Arc::new(car_migrator().unwrap());

    let view = Arc::new(CarProjection::new(
        InMemoryQueryStore::new(),
        migrator.clone(),
    ));
    let projector =
        Arc::new(ReadModelProjector::new(store.clone()).with_projection(view.clone()));

    let bus = InMemoryMessageBusStore::new();
    let audits = InMemoryQueueStore::new(AUDITS_QUEUE);
    let registration = EventNotificationRegistration::<CarEvent>::new("Car", migrator.clone())
        .with_consumer(Arc::new(CarAuditConsumer::new(audits.clone())))
        .with_translator(Arc::new(CarIntegrationTranslator));
    let notifier = Arc::new(
        EventNotifier::new(Arc::new(TopicMessageBroker::new(bus.clone())))
            .with_registration(Arc::new(registration)),
    );

    let repository = EventSourcingRepository::new(store.clone())
        .with_migrator(migrator)
        .with_observer(projector.clone())
        .with_observer(notifier);

    Harness {
        store,
        service: CarService::new(repository),
        projector,
        view,
        bus,
        audits,
    }
}

async fn registered_car(harness: &Harness) -> Identifier {
    let cmd = CreateCar::for_organization("org_1");
    let car_id = cmd.car_id.clone();
    harness.service.create_car(cmd).await.unwrap();
    harness
        .service
        .set_manufacturer(SetManufacturer::new(car_id.clone(), 2024, "Toyota", "Corolla"))
        .await
        .unwrap();
    harness
        .service
        .change_ownership(ChangeOwnership::new(car_id.clone(), "user_1"))
        .await
        .unwrap();
    harness
        .service
        .register_car(RegisterCar::new(car_id.clone(), "NZ", "Auckland", "ABC123"))
        .await
        .unwrap();
    car_id
}

async fn drain_topic(harness: &Harness) -> Vec<String> {
    let received = Arc::new(Mutex::new(Vec::new()));
    loop {
        let sink = received.clone();
        let handler = move |message: QueuedMessage<IntegrationEventMessage>| {
            let sink = sink.clone();
            async move {
                sink.lock().await.push(message.payload.event_name);
                Ok::<(), HandlerError>(())
            }
        };
        if !harness
            .bus
            .receive_single(INTEGRATION_EVENTS_TOPIC, "api", &handler)
            .await
            .unwrap()
        {
            break;
        }
    }
    let names = received.lock().await.clone();
    names
}

#[tokio::test]
async fn lifecycle_updates_view_audits_and_topic() {
    let harness = setup();
    let car_id = registered_car(&harness).await;

    let row = harness.view.store().get(&car_id).await.unwrap().unwrap();
    assert_eq!(row.status, CarStatus::Registered);
    assert_eq!(row.plate_number.as_deref(), Some("ABC123"));
    assert_eq!(row.make.as_deref(), Some("Toyota"));
    assert_eq!(row.last_version, Version::new(4));

    assert_eq!(harness.audits.count().await.unwrap(), 1);
    assert_eq!(drain_topic(&harness).await, vec!["Car.Created", "Car.Registered"]);
}

#[tokio::test]
async fn deletion_removes_row_and_publishes() {
    let harness = setup();
    let car_id = registered_car(&harness).await;
    drain_topic(&harness).await;

    harness
        .service
        .delete_car(DeleteCar::new(car_id.clone(), "user_2"))
        .await
        .unwrap();

    assert!(harness.view.store().get(&car_id).await.unwrap().is_none());
    assert_eq!(harness.audits.count().await.unwrap(), 2);
    assert_eq!(drain_topic(&harness).await, vec!["Car.Deleted"]);
}

#[tokio::test]
async fn rebuild_restores_the_view_from_the_store() {
    let harness = setup();
    let first = registered_car(&harness).await;
    let second = registered_car(&harness).await;

    harness.view.store().destroy_all().await.unwrap();
    assert_eq!(harness.view.store().count().await.unwrap(), 0);

    let replayed = harness.projector.rebuild_all().await.unwrap();

    assert_eq!(replayed, 8);
    assert_eq!(harness.view.store().count().await.unwrap(), 2);
    for id in [first, second] {
        let row = harness.view.store().get(&id).await.unwrap().unwrap();
        assert_eq!(row.status, CarStatus::Registered);
    }
}

#[tokio::test]
async fn rebuild_projects_legacy_events() {
    let harness = setup();
    let cmd = CreateCar::for_organization("org_1");
    let car_id = cmd.car_id.clone();
    harness.service.create_car(cmd).await.unwrap();

    let legacy = NewEvent::builder()
        .root_id(car_id.clone())
        .root_aggregate_type("Car")
        .event_type("NumberPlateAssigned")
        .version(Version::new(2))
        .data_raw(serde_json::json!({
            "number_plate": "OLD111",
            "country": "NZ",
            "region": "Otago"
        }))
        .build();
    harness
        .store
        .add_events("Car", car_id.as_str(), vec![legacy])
        .await
        .unwrap();

    harness.projector.rebuild_all().await.unwrap();

    let row = harness.view.store().get(&car_id).await.unwrap().unwrap();
    assert_eq!(row.plate_number.as_deref(), Some("OLD111"));
    assert_eq!(row.jurisdiction.as_deref(), Some("NZ-Otago"));

    let car = harness.service.get_car(&car_id).await.unwrap();
    assert_eq!(car.state().plate().map(|p| p.number.as_str()), Some("OLD111"));
}

#[tokio::test]
async fn destroy_all_clears_store_and_view() {
    let harness = setup();
    let car_id = registered_car(&harness).await;

    harness.service.repository().destroy_all().await.unwrap();

    assert!(harness.view.store().get(&car_id).await.unwrap().is_none());
    assert!(
        harness
            .store
            .get_event_stream("Car", car_id.as_str())
            .await
            .unwrap()
            .is_empty()
    );
}
