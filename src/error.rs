//! Error types for the notification layer.

use crate::types::{DocumentKey, SubscriptionId};
use thiserror::Error;

/// Main error type for notification and store operations.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification service is not initialized")]
    NotInitialized,

    #[error("Subscription has no collection")]
    IncompleteSubscription,

    #[error("Subscription {0} is already bound to a collection")]
    AlreadyBound(SubscriptionId),

    #[error("Subscription {0} already has an observer")]
    ObserverAlreadyAttached(SubscriptionId),

    #[error("Subscription {0} was unsubscribed")]
    Unsubscribed(SubscriptionId),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Duplicate key {key} in collection {collection}")]
    DuplicateKey { collection: String, key: DocumentKey },

    #[error("Document {key} not found in collection {collection}")]
    DocumentNotFound { collection: String, key: DocumentKey },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Dispatcher is closed")]
    DispatcherClosed,
}

impl From<serde_json::Error> for NotifyError {
    fn from(e: serde_json::Error) -> Self {
        NotifyError::Serialization(e.to_string())
    }
}

/// Result type for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
