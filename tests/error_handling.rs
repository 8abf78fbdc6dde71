//! Error handling and edge case tests.

use realtime_records::{
    CollectionHandle, CollectionSubscription, Document, DocumentKey, DocumentSubscription,
    MemoryStore, NotificationConfig, NotificationService, NotifyError, RealtimeConfig,
    RealtimeStore, Result, Store, Subscription, SubscriptionState,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

fn service() -> NotificationService {
    NotificationService::new(NotificationConfig::default()).unwrap()
}

/// Store whose collections always fail to read.
struct BrokenStore;

struct BrokenCollection(String);

impl CollectionHandle for BrokenCollection {
    fn name(&self) -> &str {
        &self.0
    }

    fn query_all(&self) -> Result<Vec<Document>> {
        Err(NotifyError::CollectionNotFound(self.0.clone()))
    }

    fn find_by_key(&self, _key: &DocumentKey) -> Result<Option<Document>> {
        Err(NotifyError::CollectionNotFound(self.0.clone()))
    }
}

impl Store for BrokenStore {
    fn collection(&self, name: &str) -> Result<Arc<dyn CollectionHandle>> {
        Ok(Arc::new(BrokenCollection(name.to_string())))
    }
}

/// Store that refuses to hand out handles.
struct ClosedStore;

impl Store for ClosedStore {
    fn collection(&self, name: &str) -> Result<Arc<dyn CollectionHandle>> {
        Err(NotifyError::CollectionNotFound(name.to_string()))
    }
}

// --- Initialization ---

#[test]
fn test_register_before_initialize() {
    let service = service();

    let result = service.builder().collection::<Value>("users").subscribe(|_| {});
    assert!(matches!(result, Err(NotifyError::NotInitialized)));
    assert_eq!(service.subscription_count(), 0);
}

#[test]
fn test_notify_before_initialize() {
    let service = service();
    service.mark_collection_changed("users");

    assert!(matches!(service.notify_all(), Err(NotifyError::NotInitialized)));
}

#[test]
fn test_reinitialize_keeps_existing_bindings() {
    let first = Arc::new(MemoryStore::new());
    first
        .get_or_create("users")
        .insert(Document::new(1, json!("first")))
        .unwrap();
    let second = Arc::new(MemoryStore::new());

    let service = service();
    service.initialize(first.clone());

    let counter = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&counter);
    let _unsubscriber = service
        .builder()
        .collection::<Value>("users")
        .subscribe(move |docs| {
            seen.store(docs.len(), Ordering::SeqCst);
        })
        .unwrap();

    service.initialize(second.clone());
    service.mark_collection_changed("users");
    service.notify_all().unwrap();
    assert!(service.wait_idle(WAIT));

    // Still reading from the store it was registered against.
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

// --- Registration ---

#[test]
fn test_unset_collection_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let service = service();
    service.initialize(store.clone());

    let sub = Arc::new(CollectionSubscription::<Value>::new(None));
    assert!(matches!(
        service.register(sub.clone()),
        Err(NotifyError::IncompleteSubscription)
    ));
    assert_eq!(sub.state(), SubscriptionState::Unbound);
    assert!(store.collection_names().is_empty());
}

#[test]
fn test_store_error_surfaces_at_registration() {
    let service = service();
    service.initialize(Arc::new(ClosedStore));

    let result = service.builder().collection::<Value>("users").subscribe(|_| {});
    assert!(matches!(result, Err(NotifyError::CollectionNotFound(_))));
    assert_eq!(service.subscription_count(), 0);
}

#[test]
fn test_released_subscription_cannot_be_reused() {
    let service = service();
    service.initialize(Arc::new(MemoryStore::new()));

    let sub = Arc::new(DocumentSubscription::<Value>::new(Some("users".into()), 1));
    let unsubscriber = service.register(sub.clone()).unwrap();
    unsubscriber.release();

    assert!(matches!(
        sub.attach_observer(|_| {}),
        Err(NotifyError::Unsubscribed(_))
    ));
    assert!(matches!(
        service.register(sub),
        Err(NotifyError::Unsubscribed(_))
    ));
}

// --- Dispatch failures ---

#[test]
fn test_materialization_failure_is_contained() {
    let service = service();
    service.initialize(Arc::new(BrokenStore));

    let calls = Arc::new(AtomicUsize::new(0));
    let observed = Arc::clone(&calls);
    let _unsubscriber = service
        .builder()
        .collection::<Value>("users")
        .subscribe(move |_| {
            observed.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    service.mark_broadcast("users");
    assert_eq!(service.notify_all().unwrap(), 1);
    assert!(service.wait_idle(WAIT));

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(service.stats().failed, 1);
    assert_eq!(service.subscription_count(), 1);
}

#[test]
fn test_undecodable_document_is_contained() {
    let store = Arc::new(MemoryStore::new());
    store
        .get_or_create("numbers")
        .insert(Document::new(1, json!("not a number")))
        .unwrap();

    let service = service();
    service.initialize(store);

    let _unsubscriber = service
        .builder()
        .collection::<u64>("numbers")
        .id(1)
        .subscribe(|_| {})
        .unwrap();

    service.mark_document_changed("numbers", &DocumentKey::from(1));
    service.notify_all().unwrap();
    assert!(service.wait_idle(WAIT));

    assert_eq!(service.stats().failed, 1);
    assert_eq!(service.stats().delivered, 0);
}

#[test]
fn test_notification_without_observer_is_skipped() {
    let service = service();
    service.initialize(Arc::new(MemoryStore::new()));

    let sub = Arc::new(CollectionSubscription::<Value>::new(Some("users".into())));
    let _unsubscriber = service.register(sub.clone()).unwrap();
    assert_eq!(sub.state(), SubscriptionState::Bound);

    service.mark_collection_changed("users");
    assert_eq!(service.notify_all().unwrap(), 1);
    assert!(service.wait_idle(WAIT));

    let stats = service.stats();
    assert_eq!(stats.delivered, 0);
    assert_eq!(stats.failed, 0);
}

// --- Write path ---

#[test]
fn test_duplicate_insert_fails_without_notifying() {
    let store = RealtimeStore::new(RealtimeConfig::default()).unwrap();
    store.insert("users", Document::new(1, json!({}))).unwrap();
    let passes = store.notifications().stats().passes;

    let result = store.insert("users", Document::new(1, json!({})));
    assert!(matches!(result, Err(NotifyError::DuplicateKey { .. })));
    assert_eq!(store.notifications().stats().passes, passes);
}

#[test]
fn test_zero_workers_still_dispatches() {
    let service = NotificationService::new(NotificationConfig {
        worker_threads: 0,
        ..Default::default()
    })
    .unwrap();
    service.initialize(Arc::new(MemoryStore::new()));

    let calls = Arc::new(AtomicUsize::new(0));
    let observed = Arc::clone(&calls);
    let _unsubscriber = service
        .builder()
        .collection::<Value>("users")
        .subscribe(move |_| {
            observed.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    service.mark_collection_changed("users");
    service.notify_all().unwrap();
    assert!(service.wait_idle(WAIT));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
