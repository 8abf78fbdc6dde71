//! Core types shared by the store, the subscriptions and the notification service.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{NotifyError, Result};

/// Key identifying a single document inside a collection.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentKey {
    Int(i64),
    Str(String),
}

impl fmt::Debug for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKey::Int(n) => write!(f, "Key({})", n),
            DocumentKey::Str(s) => write!(f, "Key({:?})", s),
        }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKey::Int(n) => write!(f, "{}", n),
            DocumentKey::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for DocumentKey {
    fn from(n: i64) -> Self {
        DocumentKey::Int(n)
    }
}

impl From<i32> for DocumentKey {
    fn from(n: i32) -> Self {
        DocumentKey::Int(n as i64)
    }
}

impl From<u32> for DocumentKey {
    fn from(n: u32) -> Self {
        DocumentKey::Int(n as i64)
    }
}

impl From<&str> for DocumentKey {
    fn from(s: &str) -> Self {
        DocumentKey::Str(s.to_string())
    }
}

impl From<String> for DocumentKey {
    fn from(s: String) -> Self {
        DocumentKey::Str(s)
    }
}

/// A stored document: its key plus a JSON body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub key: DocumentKey,
    pub value: serde_json::Value,
}

impl Document {
    /// Document with an already-encoded value.
    pub fn new(key: impl Into<DocumentKey>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// Build a document from any serializable value.
    pub fn from_serialize(key: impl Into<DocumentKey>, value: &impl Serialize) -> Result<Self> {
        Ok(Self {
            key: key.into(),
            value: serde_json::to_value(value)?,
        })
    }

    /// Decode the body into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.value).map_err(|e| NotifyError::Deserialization(e.to_string()))
    }
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Granularity of a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionKind {
    /// Refreshed with every document of the collection.
    Collection,
    /// Refreshed with the collection handle itself.
    CollectionRaw,
    /// Refreshed with a single document.
    Document,
}

/// Lifecycle position of a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Constructed, no collection handle yet.
    Unbound,
    /// Registered with a collection handle, no observer yet.
    Bound,
    /// Registered and observed.
    Observing,
    /// Released. Terminal.
    Unsubscribed,
}

/// Counters describing notification activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationStats {
    /// Completed `notify_all` passes.
    pub passes: u64,
    /// Dispatch units handed to the dispatcher.
    pub dispatched: u64,
    /// Values that reached an observer without failing.
    pub delivered: u64,
    /// Dispatch units that failed to materialize or whose observer panicked.
    pub failed: u64,
}
