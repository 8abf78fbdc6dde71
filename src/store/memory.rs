//! In-memory record store.

use crate::error::{NotifyError, Result};
use crate::store::{CollectionHandle, Store};
use crate::types::{Document, DocumentKey};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A collection of JSON documents ordered by key.
pub struct MemoryCollection {
    name: String,
    documents: RwLock<BTreeMap<DocumentKey, serde_json::Value>>,
}

impl MemoryCollection {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            documents: RwLock::new(BTreeMap::new()),
        }
    }

    /// Insert a new document. Fails if the key is taken.
    pub fn insert(&self, document: Document) -> Result<()> {
        let mut docs = self.documents.write();
        if docs.contains_key(&document.key) {
            return Err(NotifyError::DuplicateKey {
                collection: self.name.clone(),
                key: document.key,
            });
        }
        docs.insert(document.key, document.value);
        Ok(())
    }

    /// Replace an existing document. Fails if the key is absent.
    pub fn update(&self, document: Document) -> Result<()> {
        let mut docs = self.documents.write();
        match docs.get_mut(&document.key) {
            Some(slot) => {
                *slot = document.value;
                Ok(())
            }
            None => Err(NotifyError::DocumentNotFound {
                collection: self.name.clone(),
                key: document.key,
            }),
        }
    }

    /// Insert or replace. Returns true if the document was new.
    pub fn upsert(&self, document: Document) -> bool {
        self.documents
            .write()
            .insert(document.key, document.value)
            .is_none()
    }

    /// Remove a document. Returns true if it existed.
    pub fn delete(&self, key: &DocumentKey) -> bool {
        self.documents.write().remove(key).is_some()
    }

    /// Remove every document, returning how many were removed.
    pub fn delete_all(&self) -> usize {
        let mut docs = self.documents.write();
        let count = docs.len();
        docs.clear();
        count
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }
}

impl CollectionHandle for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn query_all(&self) -> Result<Vec<Document>> {
        Ok(self
            .documents
            .read()
            .iter()
            .map(|(key, value)| Document {
                key: key.clone(),
                value: value.clone(),
            })
            .collect())
    }

    fn find_by_key(&self, key: &DocumentKey) -> Result<Option<Document>> {
        Ok(self.documents.read().get(key).map(|value| Document {
            key: key.clone(),
            value: value.clone(),
        }))
    }
}

/// Store keeping every collection in memory.
///
/// Collections are created on first access. A collection object is never
/// replaced once created, so handles given to subscriptions keep observing
/// the same data for the lifetime of the store.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Arc<MemoryCollection>>>,
}

impl MemoryStore {
    /// Create a store with no collections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the named collection.
    pub fn get_or_create(&self, name: &str) -> Arc<MemoryCollection> {
        if let Some(existing) = self.collections.read().get(name) {
            return Arc::clone(existing);
        }

        let mut collections = self.collections.write();
        Arc::clone(
            collections
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(MemoryCollection::new(name))),
        )
    }

    /// Get the named collection if it was ever created.
    pub fn get(&self, name: &str) -> Option<Arc<MemoryCollection>> {
        self.collections.read().get(name).cloned()
    }

    /// Remove every document of a collection.
    ///
    /// The collection object survives so outstanding handles stay valid.
    /// Returns false if the collection was never created.
    pub fn drop_collection(&self, name: &str) -> bool {
        match self.get(name) {
            Some(collection) => {
                collection.delete_all();
                true
            }
            None => false,
        }
    }

    /// Names of all collections created so far, sorted.
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Store for MemoryStore {
    fn collection(&self, name: &str) -> Result<Arc<dyn CollectionHandle>> {
        let handle: Arc<dyn CollectionHandle> = self.get_or_create(name);
        Ok(handle)
    }
}
