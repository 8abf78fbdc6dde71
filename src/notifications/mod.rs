//! Change notification engine.
//!
//! Writers record change signals in a [`NotificationCache`]. A call to
//! [`NotificationService::notify_all`] detaches the cache, freezes it into a
//! [`CacheSnapshot`] and tests every registered subscription against it:
//!
//! - collection and raw collection subscriptions match a broadcast or any
//!   collection-level change of their collection,
//! - document subscriptions match a broadcast or an exact document change.
//!
//! Each match becomes a [`DispatchUnit`] that runs on the service's pool of
//! dispatch worker threads, so the caller never waits for materialization or for
//! observers.

mod cache;
mod dispatch;
mod service;

pub use cache::{CacheSnapshot, NotificationCache};
pub use dispatch::{Delivery, DispatchUnit};
pub use service::{NotificationConfig, NotificationService};
