use order_payments::bus::recording::RecordingPublisher;
use order_payments::decision::fixed::FixedDecision;
use order_payments::domain::events::{InvalidFact, OrderPlaced};
use order_payments::domain::payment::{Payment, PaymentStatus};
use order_payments::repo::in_memory::InMemoryPaymentsRepo;
use order_payments::repo::{PaymentStore, StoreError};
use order_payments::service::order_placed_consumer::{ConsumeError, HandleOutcome, OrderPlacedConsumer};
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

fn consumer(
    store: &InMemoryPaymentsRepo,
    publisher: &RecordingPublisher,
    status: PaymentStatus,
) -> OrderPlacedConsumer {
    OrderPlacedConsumer::new(
        Arc::new(store.clone()),
        Arc::new(publisher.clone()),
        Arc::new(FixedDecision { status }),
    )
}

fn fact() -> OrderPlaced {
    OrderPlaced {
        order_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        game_id: Uuid::new_v4(),
        price: dec!(59.90),
    }
}

#[tokio::test]
async fn approved_order_is_stored_and_published_once() {
    let store = InMemoryPaymentsRepo::default();
    let publisher = RecordingPublisher::new();
    let input = fact();

    let outcome = consumer(&store, &publisher, PaymentStatus::Approved)
        .handle(&input)
        .await
        .unwrap();
    assert!(matches!(outcome, HandleOutcome::Processed(ref p) if p.status == PaymentStatus::Approved));

    let stored = store.get_by_order(input.order_id).await.unwrap().unwrap();
    assert_eq!(stored.amount, dec!(59.90));
    assert_eq!(stored.status, PaymentStatus::Approved);
    assert_eq!(store.len().await, 1);
    assert!(store.is_published(input.order_id).await);

    let published = publisher.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].order_id, input.order_id);
    assert_eq!(published[0].user_id, input.user_id);
    assert_eq!(published[0].game_id, input.game_id);
    assert_eq!(published[0].price, dec!(59.90));
    assert_eq!(published[0].status, "Approved");
}

#[tokio::test]
async fn rejected_decision_flows_into_store_and_event() {
    let store = InMemoryPaymentsRepo::default();
    let publisher = RecordingPublisher::new();
    let input = fact();

    consumer(&store, &publisher, PaymentStatus::Rejected)
        .handle(&input)
        .await
        .unwrap();

    let stored = store.get_by_order(input.order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Rejected);
    assert_eq!(publisher.published()[0].status, "Rejected");
}

#[tokio::test]
async fn redelivery_keeps_one_payment_and_one_event() {
    let store = InMemoryPaymentsRepo::default();
    let publisher = RecordingPublisher::new();
    let consumer = consumer(&store, &publisher, PaymentStatus::Approved);
    let input = fact();

    consumer.handle(&input).await.unwrap();
    for _ in 0..3 {
        let outcome = consumer.handle(&input).await.unwrap();
        assert_eq!(outcome, HandleOutcome::AlreadyProcessed);
    }

    assert_eq!(store.len().await, 1);
    assert_eq!(publisher.published().len(), 1);
}

#[tokio::test]
async fn redelivery_keeps_first_decision() {
    let store = InMemoryPaymentsRepo::default();
    let publisher = RecordingPublisher::new();
    let input = fact();

    consumer(&store, &publisher, PaymentStatus::Approved)
        .handle(&input)
        .await
        .unwrap();
    consumer(&store, &publisher, PaymentStatus::Rejected)
        .handle(&input)
        .await
        .unwrap();

    let stored = store.get_by_order(input.order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Approved);
    assert_eq!(publisher.published().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicates_store_one_row() {
    let store = InMemoryPaymentsRepo::default();
    let publisher = RecordingPublisher::new();
    let consumer = consumer(&store, &publisher, PaymentStatus::Approved);
    let input = fact();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let consumer = consumer.clone();
        let input = input.clone();
        handles.push(tokio::spawn(async move { consumer.handle(&input).await }));
    }

    let mut processed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(HandleOutcome::Processed(_)) => processed += 1,
            Ok(HandleOutcome::AlreadyProcessed) => {}
            Err(ConsumeError::PublicationInFlight(_)) => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    assert_eq!(processed, 1);
    assert_eq!(store.len().await, 1);
    assert_eq!(publisher.published().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_adds_have_exactly_one_winner() {
    let store = InMemoryPaymentsRepo::default();
    let order_id = Uuid::new_v4();
    let a = Payment::new(order_id, dec!(1.00), PaymentStatus::Approved, chrono::Utc::now());
    let b = Payment::new(order_id, dec!(1.00), PaymentStatus::Rejected, chrono::Utc::now());

    let (s1, s2) = (store.clone(), store.clone());
    let (r1, r2) = tokio::join!(
        tokio::spawn(async move { s1.add(&a).await }),
        tokio::spawn(async move { s2.add(&b).await }),
    );
    let results = [r1.unwrap(), r2.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| *r == Err(StoreError::DuplicateOrder(order_id))));
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn publish_failure_leaves_message_for_redelivery() {
    let store = InMemoryPaymentsRepo::new(chrono::Duration::seconds(-1));
    let publisher = RecordingPublisher::new();
    let consumer = consumer(&store, &publisher, PaymentStatus::Approved);
    let input = fact();

    publisher.fail_next(1);
    let err = consumer.handle(&input).await.unwrap_err();
    assert!(matches!(err, ConsumeError::Publish(_)));
    assert_eq!(store.len().await, 1);
    assert!(!store.is_published(input.order_id).await);
    assert!(publisher.published().is_empty());

    let outcome = consumer.handle(&input).await.unwrap();
    assert!(matches!(outcome, HandleOutcome::Republished(ref p) if p.order_id == input.order_id));
    assert_eq!(publisher.published().len(), 1);
    assert!(store.is_published(input.order_id).await);

    assert_eq!(consumer.handle(&input).await.unwrap(), HandleOutcome::AlreadyProcessed);
    assert_eq!(publisher.published().len(), 1);
}

#[tokio::test]
async fn duplicate_within_publish_lease_is_not_acked() {
    let store = InMemoryPaymentsRepo::default();
    let publisher = RecordingPublisher::new();
    let consumer = consumer(&store, &publisher, PaymentStatus::Approved);
    let input = fact();

    publisher.fail_next(1);
    assert!(consumer.handle(&input).await.is_err());

    let err = consumer.handle(&input).await.unwrap_err();
    assert_eq!(err, ConsumeError::PublicationInFlight(input.order_id));
    assert!(publisher.published().is_empty());
}

#[tokio::test]
async fn storage_outage_is_not_acked_and_publishes_nothing() {
    let store = InMemoryPaymentsRepo::default();
    let publisher = RecordingPublisher::new();
    let consumer = consumer(&store, &publisher, PaymentStatus::Approved);
    let input = fact();

    store.set_unavailable(true);
    let err = consumer.handle(&input).await.unwrap_err();
    assert!(matches!(err, ConsumeError::Storage(StoreError::Unavailable(_))));
    assert!(publisher.published().is_empty());

    store.set_unavailable(false);
    assert!(matches!(
        consumer.handle(&input).await.unwrap(),
        HandleOutcome::Processed(_)
    ));
    assert_eq!(publisher.published().len(), 1);
}

#[tokio::test]
async fn negative_price_is_rejected_without_side_effects() {
    let store = InMemoryPaymentsRepo::default();
    let publisher = RecordingPublisher::new();
    let mut input = fact();
    input.price = dec!(-1.00);

    let outcome = consumer(&store, &publisher, PaymentStatus::Approved)
        .handle(&input)
        .await
        .unwrap();

    assert_eq!(outcome, HandleOutcome::Rejected(InvalidFact::NegativePrice(dec!(-1.00))));
    assert!(store.is_empty().await);
    assert!(publisher.published().is_empty());
}

#[tokio::test]
async fn malformed_payload_is_rejected() {
    let store = InMemoryPaymentsRepo::default();
    let publisher = RecordingPublisher::new();

    let outcome = consumer(&store, &publisher, PaymentStatus::Approved)
        .handle_payload("{\"order_id\": 42}")
        .await
        .unwrap();

    assert!(matches!(outcome, HandleOutcome::Rejected(InvalidFact::Malformed(_))));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn raw_payload_is_processed() {
    let store = InMemoryPaymentsRepo::default();
    let publisher = RecordingPublisher::new();
    let order_id = Uuid::new_v4();
    let raw = serde_json::json!({
        "orderId": order_id,
        "userId": Uuid::new_v4(),
        "gameId": Uuid::new_v4(),
        "price": "19.5"
    })
    .to_string();

    let outcome = consumer(&store, &publisher, PaymentStatus::Approved)
        .handle_payload(&raw)
        .await
        .unwrap();

    assert!(matches!(outcome, HandleOutcome::Processed(_)));
    let stored = store.get_by_order(order_id).await.unwrap().unwrap();
    assert_eq!(stored.amount.to_string(), "19.50");
}

#[tokio::test]
async fn price_beyond_stored_precision_is_rejected_before_storage() {
    let store = InMemoryPaymentsRepo::default();
    let publisher = RecordingPublisher::new();
    let mut input = fact();
    input.price = dec!(100000000000000000);

    let outcome = consumer(&store, &publisher, PaymentStatus::Approved)
        .handle(&input)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        HandleOutcome::Rejected(InvalidFact::PriceOutOfRange(dec!(100000000000000000)))
    );
    assert!(store.is_empty().await);
    assert!(publisher.published().is_empty());
}
