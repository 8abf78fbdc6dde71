//! The notification service: cache swap, matching pass and dispatch.

use super::cache::NotificationCache;
use super::dispatch::{Dispatcher, StatsCounters};
use crate::error::{NotifyError, Result};
use crate::store::Store;
use crate::subscriptions::{
    Registry, Subscription, SubscriptionBuilder, SubscriptionControl, Unsubscriber,
};
use crate::types::{DocumentKey, NotificationStats};
use parking_lot::RwLock;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Notification service configuration.
#[derive(Clone, Debug)]
pub struct NotificationConfig {
    /// Worker threads running dispatch units.
    /// Default: 4
    pub worker_threads: usize,

    /// Name prefix for worker threads.
    pub thread_name: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            thread_name: "notify-dispatch".to_string(),
        }
    }
}

/// Owns the pending change signals and the active subscriptions, and turns
/// the former into deliveries for the latter.
///
/// # Concurrency contract
///
/// Marks, registration, release and [`notify_all`](Self::notify_all) may be
/// called from any thread at any time. The only synchronization point is the
/// replacement of the current cache, which happens under a short write lock.
/// Writers that mark through [`cache`](Self::cache) hold their own reference
/// to whichever cache was current when they asked; a mark landing on a cache
/// after it has been detached and frozen is lost. Marks made through the
/// service's own `mark_*` methods re-read the current cache each time, which
/// narrows but does not close that window. Delivery is eventually consistent,
/// not causally ordered.
pub struct NotificationService {
    cache: RwLock<Arc<NotificationCache>>,
    registry: Arc<Registry>,
    store: RwLock<Option<Arc<dyn Store>>>,
    dispatcher: Dispatcher,
    stats: Arc<StatsCounters>,
}

impl NotificationService {
    /// Create a service and start its dispatch workers.
    pub fn new(config: NotificationConfig) -> Result<Self> {
        let stats = Arc::new(StatsCounters::default());
        let dispatcher =
            Dispatcher::new(config.worker_threads, &config.thread_name, Arc::clone(&stats))?;

        Ok(Self {
            cache: RwLock::new(Arc::new(NotificationCache::new())),
            registry: Arc::new(Registry::new()),
            store: RwLock::new(None),
            dispatcher,
            stats,
        })
    }

    /// Bind the store subscriptions resolve their collections from.
    ///
    /// Calling it again replaces the store for later registrations; existing
    /// subscriptions keep the handles they were bound with.
    pub fn initialize(&self, store: Arc<dyn Store>) {
        let previous = self.store.write().replace(store);
        debug!(reinitialized = previous.is_some(), "notification service initialized");
    }

    /// Whether a store has been bound.
    pub fn is_initialized(&self) -> bool {
        self.store.read().is_some()
    }

    fn bound_store(&self) -> Result<Arc<dyn Store>> {
        self.store.read().clone().ok_or(NotifyError::NotInitialized)
    }

    /// Entry point of the fluent construction API.
    pub fn builder(&self) -> SubscriptionBuilder<'_> {
        SubscriptionBuilder::new(self)
    }

    // --- Registration ---

    /// Bind a subscription to its collection and make it active.
    pub fn register(&self, subscription: Arc<dyn Subscription>) -> Result<Unsubscriber> {
        let store = self.bound_store()?;
        let collection = subscription
            .collection()
            .ok_or(NotifyError::IncompleteSubscription)?;

        let handle = store.collection(collection)?;
        subscription.bind(handle)?;
        self.registry.insert(Arc::clone(&subscription));

        debug!(
            subscription = %subscription.id(),
            kind = ?subscription.kind(),
            collection,
            "registered subscription"
        );

        Ok(Unsubscriber::new(Arc::clone(&self.registry), subscription))
    }

    /// Number of active subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.registry.len()
    }

    // --- Write path ---

    /// The cache currently collecting marks.
    pub fn cache(&self) -> Arc<NotificationCache> {
        self.cache.read().clone()
    }

    /// Mark a collection-level change on the current cache.
    pub fn mark_collection_changed(&self, collection: &str) {
        self.cache().mark_collection_changed(collection);
    }

    /// Mark one document as changed on the current cache.
    pub fn mark_document_changed(&self, collection: &str, key: &DocumentKey) {
        self.cache().mark_document_changed(collection, key);
    }

    /// Mark a whole collection as changed on the current cache.
    pub fn mark_broadcast(&self, collection: &str) {
        self.cache().mark_broadcast(collection);
    }

    /// Discard pending marks without notifying anyone.
    pub fn clear_cache(&self) {
        self.cache().clear();
    }

    // --- Dispatch ---

    /// Swap in an empty cache and dispatch every subscription the detached
    /// marks are relevant to.
    ///
    /// Returns once every dispatch unit is queued, with the number queued.
    /// A failure to dispatch one subscription is logged and does not stop
    /// the pass.
    pub fn notify_all(&self) -> Result<usize> {
        self.bound_store()?;

        let detached = std::mem::replace(
            &mut *self.cache.write(),
            Arc::new(NotificationCache::new()),
        );
        let snapshot = detached.freeze();
        self.stats.passes.fetch_add(1, Ordering::Relaxed);

        if snapshot.is_empty() {
            return Ok(0);
        }

        let mut dispatched = 0;
        for subscription in self.registry.entries() {
            if !subscription.is_relevant(&snapshot) {
                continue;
            }
            let id = subscription.id();
            match self.dispatch(subscription) {
                Ok(()) => dispatched += 1,
                Err(e) => warn!(subscription = %id, error = %e, "dispatch failed"),
            }
        }

        debug!(dispatched, "notification pass complete");
        Ok(dispatched)
    }

    /// Refresh one subscription now, whatever the cache holds.
    pub fn notify_one(&self, subscription: Arc<dyn Subscription>) -> Result<()> {
        self.bound_store()?;
        self.dispatch(subscription)
    }

    fn dispatch(&self, subscription: Arc<dyn Subscription>) -> Result<()> {
        let unit = subscription.dispatch_unit()?;
        self.dispatcher.submit(unit)
    }

    // --- Introspection ---

    /// Counters accumulated since the service was created.
    pub fn stats(&self) -> NotificationStats {
        self.stats.snapshot()
    }

    /// Dispatch units queued or running.
    pub fn pending_dispatches(&self) -> usize {
        self.dispatcher.pending()
    }

    /// Block until every queued dispatch unit has run, or `timeout` elapses.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.dispatcher.wait_idle(timeout)
    }
}
