//! Write path that keeps subscribers informed.
//!
//! [`RealtimeStore`] applies mutations to a [`MemoryStore`], records the
//! matching change signals and, unless a batch is open, flushes them with
//! [`NotificationService::notify_all`] right away.

use crate::error::Result;
use crate::notifications::{NotificationConfig, NotificationService};
use crate::store::{MemoryCollection, MemoryStore};
use crate::subscriptions::SubscriptionBuilder;
use crate::types::{Document, DocumentKey};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Realtime store configuration.
#[derive(Clone, Debug)]
pub struct RealtimeConfig {
    /// Flush after every write outside a batch.
    /// Default: true
    pub auto_notify: bool,

    /// Configuration of the owned notification service.
    pub notifications: NotificationConfig,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            auto_notify: true,
            notifications: NotificationConfig::default(),
        }
    }
}

/// A [`MemoryStore`] whose writes notify subscribers.
pub struct RealtimeStore {
    config: RealtimeConfig,
    store: Arc<MemoryStore>,
    notifications: NotificationService,
    batch_depth: AtomicUsize,
}

impl RealtimeStore {
    /// Create an empty store.
    pub fn new(config: RealtimeConfig) -> Result<Self> {
        Self::with_store(Arc::new(MemoryStore::new()), config)
    }

    /// Wrap an existing store.
    pub fn with_store(store: Arc<MemoryStore>, config: RealtimeConfig) -> Result<Self> {
        let notifications = NotificationService::new(config.notifications.clone())?;
        notifications.initialize(store.clone());

        Ok(Self {
            config,
            store,
            notifications,
            batch_depth: AtomicUsize::new(0),
        })
    }

    /// The underlying store. Writes made here directly are not marked.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// The notification service fed by this store's writes.
    pub fn notifications(&self) -> &NotificationService {
        &self.notifications
    }

    /// Start building a subscription.
    pub fn subscribe(&self) -> SubscriptionBuilder<'_> {
        self.notifications.builder()
    }

    // --- Document writes ---

    /// Insert a new document.
    pub fn insert(&self, collection: &str, document: Document) -> Result<()> {
        let key = document.key.clone();
        self.collection(collection).insert(document)?;
        self.document_written(collection, &key);
        Ok(())
    }

    /// Replace an existing document.
    pub fn update(&self, collection: &str, document: Document) -> Result<()> {
        let key = document.key.clone();
        self.collection(collection).update(document)?;
        self.document_written(collection, &key);
        Ok(())
    }

    /// Insert or replace. Returns true if the document was new.
    pub fn upsert(&self, collection: &str, document: Document) -> Result<bool> {
        let key = document.key.clone();
        let inserted = self.collection(collection).upsert(document);
        self.document_written(collection, &key);
        Ok(inserted)
    }

    /// Delete a document. Returns true if it existed.
    pub fn delete(&self, collection: &str, key: impl Into<DocumentKey>) -> Result<bool> {
        let key = key.into();
        let removed = self.collection(collection).delete(&key);
        if removed {
            self.document_written(collection, &key);
        }
        Ok(removed)
    }

    // --- Collection writes ---

    /// Delete every document of a collection. Returns how many were removed.
    pub fn delete_all(&self, collection: &str) -> Result<usize> {
        let removed = self.collection(collection).delete_all();
        if removed > 0 {
            self.collection_invalidated(collection);
        }
        Ok(removed)
    }

    /// Drop a collection. Returns false if it never existed.
    pub fn drop_collection(&self, collection: &str) -> Result<bool> {
        let dropped = self.store.drop_collection(collection);
        if dropped {
            self.collection_invalidated(collection);
        }
        Ok(dropped)
    }

    // --- Batching ---

    /// Run `f` with notifications deferred, then flush once.
    ///
    /// Marks recorded inside `f` are flushed even if `f` fails. Nested batches
    /// flush only when the outermost one finishes.
    pub fn batch<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Self) -> Result<R>,
    {
        let guard = BatchGuard::enter(&self.batch_depth);
        let outermost = guard.depth == 1;
        let result = f(self);
        drop(guard);

        if outermost {
            self.flush();
        }
        result
    }

    /// Whether a [`batch`](Self::batch) is running.
    pub fn in_batch(&self) -> bool {
        self.batch_depth.load(Ordering::Acquire) > 0
    }

    // --- Internals ---

    fn collection(&self, name: &str) -> Arc<MemoryCollection> {
        self.store.get_or_create(name)
    }

    fn document_written(&self, collection: &str, key: &DocumentKey) {
        let cache = self.notifications.cache();
        cache.mark_collection_changed(collection);
        cache.mark_document_changed(collection, key);
        self.after_write();
    }

    fn collection_invalidated(&self, collection: &str) {
        self.notifications.mark_broadcast(collection);
        self.after_write();
    }

    fn after_write(&self) {
        if self.config.auto_notify && !self.in_batch() {
            self.flush();
        }
    }

    fn flush(&self) {
        match self.notifications.notify_all() {
            Ok(dispatched) => debug!(dispatched, "flushed writes"),
            Err(e) => warn!(error = %e, "flush failed"),
        }
    }
}

/// Keeps the batch depth balanced even if the batch body panics.
struct BatchGuard<'a> {
    depth_counter: &'a AtomicUsize,
    depth: usize,
}

impl<'a> BatchGuard<'a> {
    fn enter(depth_counter: &'a AtomicUsize) -> Self {
        let depth = depth_counter.fetch_add(1, Ordering::AcqRel) + 1;
        Self {
            depth_counter,
            depth,
        }
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.depth_counter.fetch_sub(1, Ordering::AcqRel);
    }
}
