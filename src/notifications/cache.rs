//! Pending change signals.
//!
//! A [`NotificationCache`] collects marks from any number of writers. When a
//! notification pass runs, the service detaches the cache and freezes it into
//! a [`CacheSnapshot`], which is what subscriptions are matched against.

use crate::types::DocumentKey;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// Change signals recorded since the last flush.
///
/// All mark operations take `&self` and may be called concurrently; each set
/// sits behind its own lock and membership only ever grows until the cache is
/// frozen or cleared.
#[derive(Default)]
pub struct NotificationCache {
    broadcasts: RwLock<HashSet<String>>,
    collections: RwLock<HashSet<String>>,
    documents: RwLock<HashMap<String, HashSet<DocumentKey>>>,
}

impl NotificationCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an incremental change somewhere in `collection`.
    pub fn mark_collection_changed(&self, collection: &str) {
        trace!(collection, "mark collection");
        if !self.collections.read().contains(collection) {
            self.collections.write().insert(collection.to_string());
        }
    }

    /// Record a change to exactly one document.
    pub fn mark_document_changed(&self, collection: &str, key: &DocumentKey) {
        trace!(collection, %key, "mark document");
        let mut documents = self.documents.write();
        match documents.get_mut(collection) {
            Some(keys) => {
                keys.insert(key.clone());
            }
            None => {
                documents.insert(collection.to_string(), HashSet::from([key.clone()]));
            }
        }
    }

    /// Record that the whole collection must be treated as changed.
    pub fn mark_broadcast(&self, collection: &str) {
        trace!(collection, "mark broadcast");
        if !self.broadcasts.read().contains(collection) {
            self.broadcasts.write().insert(collection.to_string());
        }
    }

    /// Drop every recorded signal.
    pub fn clear(&self) {
        self.broadcasts.write().clear();
        self.collections.write().clear();
        self.documents.write().clear();
    }

    /// Whether no signal has been recorded since the last freeze or clear.
    pub fn is_empty(&self) -> bool {
        self.broadcasts.read().is_empty()
            && self.collections.read().is_empty()
            && self.documents.read().is_empty()
    }

    /// Move the recorded signals into an immutable snapshot, leaving this
    /// cache empty. Only a notification pass drains the live cache.
    pub(crate) fn freeze(&self) -> CacheSnapshot {
        CacheSnapshot {
            broadcasts: std::mem::take(&mut *self.broadcasts.write()),
            collections: std::mem::take(&mut *self.collections.write()),
            documents: std::mem::take(&mut *self.documents.write()),
        }
    }
}

/// Frozen change signals used for one matching pass.
#[derive(Clone, Debug, Default)]
pub struct CacheSnapshot {
    broadcasts: HashSet<String>,
    collections: HashSet<String>,
    documents: HashMap<String, HashSet<DocumentKey>>,
}

impl CacheSnapshot {
    /// Whether `collection` was marked as fully invalidated.
    pub fn is_broadcast(&self, collection: &str) -> bool {
        self.broadcasts.contains(collection)
    }

    /// Whether `collection` saw at least one incremental change.
    pub fn is_collection_changed(&self, collection: &str) -> bool {
        self.collections.contains(collection)
    }

    /// Whether the exact `(collection, key)` pair was marked.
    pub fn is_document_changed(&self, collection: &str, key: &DocumentKey) -> bool {
        self.documents
            .get(collection)
            .map_or(false, |keys| keys.contains(key))
    }

    /// Matching rule for collection-scoped subscribers.
    pub fn matches_collection(&self, collection: &str) -> bool {
        self.is_broadcast(collection) || self.is_collection_changed(collection)
    }

    /// Matching rule for document-scoped subscribers.
    ///
    /// A change recorded only at collection level does not match.
    pub fn matches_document(&self, collection: &str, key: &DocumentKey) -> bool {
        self.is_broadcast(collection) || self.is_document_changed(collection, key)
    }

    pub fn is_empty(&self) -> bool {
        self.broadcasts.is_empty() && self.collections.is_empty() && self.documents.is_empty()
    }
}
