//! Coherence Tests for the Book Service
//!
//! Checks the store/cache/bus guarantees of the facade with in-memory
//! backends whose availability can be switched off mid-test.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bookshelf::{
    cache::{BookCache, MemoryBookCache},
    error::{ConsumeError, ServiceError},
    events::{Delivery, MemoryEventBus, RetryPolicy},
    models::{parse_book_body, BookInput},
    store::{BookStore, MemoryBookStore},
    tasks::{spawn_event_consumer_with, ConsumerOptions, ConsumerState, EventHandler},
    BookService,
};

const TOPIC: &str = "book_events";

// == Helper Functions ==

struct Harness {
    service: BookService,
    store: Arc<MemoryBookStore>,
    cache: Arc<MemoryBookCache>,
    bus: MemoryEventBus,
}

fn harness_with_ttl(ttl_seconds: i64) -> Harness {
    let store = Arc::new(MemoryBookStore::new());
    let cache = Arc::new(MemoryBookCache::new(ttl_seconds));
    let bus = MemoryEventBus::new();
    let service = BookService::new(store.clone(), cache.clone(), Arc::new(bus.clone()), TOPIC)
        .with_retry_policy(RetryPolicy {
            max_retries: 5,
            backoff: Duration::from_millis(1),
        });
    Harness {
        service,
        store,
        cache,
        bus,
    }
}

fn harness() -> Harness {
    harness_with_ttl(300)
}

fn dune() -> BookInput {
    BookInput::new("Dune", "Herbert", 1965)
}

// == Read-your-writes ==

#[tokio::test]
async fn test_read_your_writes_with_healthy_cache() {
    let h = harness();
    let created = h.service.create(dune()).await.unwrap();

    let read = h.service.read_one(created.id).await.unwrap();
    assert_eq!(read, created);
}

#[tokio::test]
async fn test_read_your_writes_with_cache_down() {
    let h = harness();
    h.cache.set_online(false);

    let created = h.service.create(dune()).await.unwrap();
    let read = h.service.read_one(created.id).await.unwrap();
    assert_eq!(read, created);
}

// == Cache warms on miss ==

#[tokio::test]
async fn test_cold_read_warms_cache() {
    let h = harness();
    let stored = h.store.insert(dune()).await.unwrap();
    assert!(!h.cache.contains(stored.id).await);

    h.service.read_one(stored.id).await.unwrap();
    h.store.set_online(false);

    let read = h.service.read_one(stored.id).await.unwrap();
    assert_eq!(read, stored);
}

#[tokio::test]
async fn test_warm_entry_expires_after_ttl() {
    let h = harness_with_ttl(1);
    let stored = h.store.insert(dune()).await.unwrap();
    h.service.read_one(stored.id).await.unwrap();
    h.store.set_online(false);

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let err = h.service.read_one(stored.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::Store { .. }));
}

// == Writes invalidate the cache ==

#[tokio::test]
async fn test_update_overwrites_cached_entry() {
    let h = harness();
    let created = h.service.create(dune()).await.unwrap();
    h.service.read_one(created.id).await.unwrap();

    h.service
        .update(created.id, BookInput::new("Dune", "Frank Herbert", 1965))
        .await
        .unwrap();
    h.store.set_online(false);

    let read = h.service.read_one(created.id).await.unwrap();
    assert_eq!(read.author, "Frank Herbert");
}

#[tokio::test]
async fn test_delete_evicts_cached_entry() {
    let h = harness();
    let created = h.service.create(dune()).await.unwrap();
    assert!(h.cache.contains(created.id).await);

    h.service.delete(created.id).await.unwrap();

    let err = h.service.read_one(created.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(id) if id == created.id));
}

// == Publisher failures ==

#[tokio::test]
async fn test_writes_succeed_with_bus_down() {
    let h = harness();
    h.bus.set_online(false);

    let created = h.service.create(dune()).await.unwrap();
    assert_eq!(h.store.get_by_id(created.id).await.unwrap(), created);

    let updated = h
        .service
        .update(created.id, BookInput::new("Dune Messiah", "Herbert", 1969))
        .await
        .unwrap();
    assert_eq!(h.store.get_by_id(created.id).await.unwrap(), updated);

    h.service.delete(created.id).await.unwrap();
    assert_eq!(h.store.len().await, 0);

    assert_eq!(h.service.stats().publish_failures, 3);
    assert!(h.bus.published(TOPIC).is_empty());
}

// == Id immutability ==

#[tokio::test]
async fn test_update_keeps_path_id() {
    let h = harness();
    let created = h.service.create(dune()).await.unwrap();
    let other = h.service.create(BookInput::new("Emma", "Austen", 1815)).await.unwrap();

    let input =
        parse_book_body(br#"{"id":2,"title":"Dune","author":"F. Herbert","year":1965}"#).unwrap();
    let updated = h.service.update(created.id, input).await.unwrap();

    assert_eq!(updated.id, created.id);
    assert_eq!(h.store.get_by_id(other.id).await.unwrap(), other);
    assert_eq!(h.store.get_by_id(created.id).await.unwrap().author, "F. Herbert");
}

// == Validation ==

#[tokio::test]
async fn test_validation_names_missing_field() {
    let h = harness();

    let err = h
        .service
        .create(BookInput::new("", "Herbert", 1965))
        .await
        .unwrap_err();

    match err {
        ServiceError::Validation(details) => {
            assert!(details.iter().any(|d| d.contains("title")));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert!(h.cache.is_empty().await);
}

// == Consumer at-least-once ==

#[derive(Default)]
struct RecordingHandler {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, delivery: &Delivery) -> Result<(), ConsumeError> {
        self.seen.lock().unwrap().push(delivery.payload.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_consumer_sees_every_published_event() {
    let h = harness();
    let handler = Arc::new(RecordingHandler::default());
    let consumer = spawn_event_consumer_with(
        Arc::new(h.bus.clone()),
        TOPIC,
        "book-events-group",
        handler.clone(),
        ConsumerOptions {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
        },
    );

    let first = h.service.create(dune()).await.unwrap();
    h.service.create(BookInput::new("Emma", "Austen", 1815)).await.unwrap();

    // Outage between writes: the consumer drops and resubscribes.
    h.bus.set_online(false);
    let mut state = consumer.subscribe_state();
    tokio::time::timeout(
        Duration::from_secs(2),
        state.wait_for(|s| *s == ConsumerState::Subscribing),
    )
    .await
    .unwrap()
    .unwrap();
    h.bus.set_online(true);

    h.service
        .update(first.id, BookInput::new("Dune", "Frank Herbert", 1965))
        .await
        .unwrap();
    h.service.delete(first.id).await.unwrap();

    let published = h.bus.published(TOPIC);
    assert_eq!(published.len(), 4);

    let mut observed = Vec::new();
    for _ in 0..200 {
        observed = handler.seen.lock().unwrap().clone();
        if published.iter().all(|p| observed.contains(p)) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    for payload in &published {
        assert!(observed.contains(payload), "consumer never saw {:?}", payload);
    }

    consumer.shutdown().await;
}
