//! Record store seam.
//!
//! The notification layer never reads storage directly. Subscriptions obtain a
//! [`CollectionHandle`] from a [`Store`] when they are registered and use it to
//! re-fetch their value every time they are dispatched.

mod memory;

pub use memory::{MemoryCollection, MemoryStore};

use crate::error::Result;
use crate::types::{Document, DocumentKey};
use std::sync::Arc;

/// A source of collection handles.
pub trait Store: Send + Sync {
    /// Acquire a handle to the named collection.
    ///
    /// The handle must stay valid for as long as a subscription holds it.
    fn collection(&self, name: &str) -> Result<Arc<dyn CollectionHandle>>;
}

/// Read access to one collection.
pub trait CollectionHandle: Send + Sync {
    /// Name of the collection.
    fn name(&self) -> &str;

    /// Every document of the collection, in the store's order.
    fn query_all(&self) -> Result<Vec<Document>>;

    /// The document with `key`, if it exists.
    fn find_by_key(&self, key: &DocumentKey) -> Result<Option<Document>>;
}
