//! Subscriptions to collections and documents.
//!
//! Three variants share one lifecycle:
//!
//! - [`CollectionSubscription`] delivers every document of a collection,
//! - [`CollectionRawSubscription`] delivers the collection handle,
//! - [`DocumentSubscription`] delivers one document, or `None` once it is gone.
//!
//! A subscription starts unbound, is bound to a collection handle when
//! registered, starts observing once an observer is attached, and ends when
//! its [`Unsubscriber`] is released.
//!
//! # Example
//!
//! ```ignore
//! let unsubscriber = service
//!     .builder()
//!     .collection::<User>("users")
//!     .subscribe(|users| println!("{} users", users.len()))?;
//!
//! service.mark_collection_changed("users");
//! service.notify_all()?;
//!
//! unsubscriber.release();
//! ```

mod builder;
mod registry;
mod types;

pub use builder::{
    CollectionRawSubscriptionBuilder, CollectionSubscriptionBuilder, DocumentSubscriptionBuilder,
    SubscriptionBuilder,
};
pub use registry::{Registry, Unsubscriber};
pub(crate) use types::SubscriptionControl;
pub use types::{
    CollectionRawSubscription, CollectionSubscription, DocumentSubscription, Observer,
    RawCollection, Subscription,
};
