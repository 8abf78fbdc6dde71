//! # Realtime Records
//!
//! Change notifications for collections and documents of a record store.
//!
//! ## Core Concepts
//!
//! - **Marks**: writers record which collections and documents changed, or
//!   broadcast that a whole collection must be treated as changed
//! - **Subscriptions**: interest in a collection, a collection handle, or one
//!   document, each with its own matching rule
//! - **Notification pass**: swaps out the pending marks and refreshes every
//!   subscription they concern, off the caller's thread
//! - **Unsubscriber**: explicit, idempotent release of a subscription
//!
//! ## Example
//!
//! ```ignore
//! use realtime_records::{Document, RealtimeConfig, RealtimeStore};
//!
//! let store = RealtimeStore::new(RealtimeConfig::default())?;
//!
//! let unsubscriber = store
//!     .subscribe()
//!     .collection::<User>("users")
//!     .subscribe(|users| println!("{} users", users.len()))?;
//!
//! // Every write marks the cache and flushes it to matching subscribers.
//! store.insert("users", Document::from_serialize(1, &user)?)?;
//!
//! unsubscriber.release();
//! ```

pub mod error;
pub mod notifications;
pub mod realtime;
pub mod store;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use error::{NotifyError, Result};
pub use notifications::{
    CacheSnapshot, Delivery, DispatchUnit, NotificationCache, NotificationConfig,
    NotificationService,
};
pub use realtime::{RealtimeConfig, RealtimeStore};
pub use store::{CollectionHandle, MemoryCollection, MemoryStore, Store};
pub use subscriptions::{
    CollectionRawSubscription, CollectionRawSubscriptionBuilder, CollectionSubscription,
    CollectionSubscriptionBuilder, DocumentSubscription, DocumentSubscriptionBuilder, Observer,
    RawCollection, Registry, Subscription, SubscriptionBuilder, Unsubscriber,
};
pub use types::*;
