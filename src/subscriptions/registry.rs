//! Active subscriptions and their release handles.

use super::types::{Subscription, SubscriptionControl};
use crate::types::SubscriptionId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Concurrent set of active subscriptions, keyed by subscription identity.
///
/// Callers never lock anything themselves. Iteration works on a copy of the
/// entries taken under the read lock, so a pass may or may not see entries
/// inserted or removed while it runs.
#[derive(Default)]
pub struct Registry {
    subscriptions: RwLock<HashMap<SubscriptionId, Arc<dyn Subscription>>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscription. Returns false if it was already present.
    pub fn insert(&self, subscription: Arc<dyn Subscription>) -> bool {
        let id = subscription.id();
        let mut subs = self.subscriptions.write();
        if subs.contains_key(&id) {
            return false;
        }
        subs.insert(id, subscription);
        true
    }

    /// Remove a subscription, returning it if it was present.
    pub fn remove(&self, id: SubscriptionId) -> Option<Arc<dyn Subscription>> {
        self.subscriptions.write().remove(&id)
    }

    /// Whether the subscription is active.
    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.subscriptions.read().contains_key(&id)
    }

    /// Number of active subscriptions.
    pub fn len(&self) -> usize {
        self.subscriptions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.read().is_empty()
    }

    /// Point-in-time copy of the active subscriptions.
    pub fn entries(&self) -> Vec<Arc<dyn Subscription>> {
        self.subscriptions.read().values().cloned().collect()
    }
}

/// Handle returned by registration. Releasing it ends the subscription.
///
/// Dropping the handle does not release anything; call [`Unsubscriber::release`].
#[must_use = "dropping an Unsubscriber leaves the subscription active"]
pub struct Unsubscriber {
    registry: Arc<Registry>,
    subscription: Arc<dyn Subscription>,
    released: AtomicBool,
}

impl Unsubscriber {
    pub(crate) fn new(registry: Arc<Registry>, subscription: Arc<dyn Subscription>) -> Self {
        Self {
            registry,
            subscription,
            released: AtomicBool::new(false),
        }
    }

    /// Identity of the subscription this handle releases.
    pub fn id(&self) -> SubscriptionId {
        self.subscription.id()
    }

    /// Whether [`release`](Self::release) has been called.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Remove the subscription from the registry.
    ///
    /// Idempotent. Returns true only for the call that did the removal. Once
    /// this returns, no observer call for the subscription is running or will
    /// start. Called from inside an observer, it does not wait for observer
    /// calls running on other threads.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.subscription.mark_unsubscribed();
        let removed = self.registry.remove(self.subscription.id()).is_some();
        debug!(subscription = %self.subscription.id(), removed, "unsubscribed");
        true
    }
}

impl fmt::Debug for Unsubscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscriber")
            .field("id", &self.id())
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriptions::CollectionSubscription;
    use crate::types::SubscriptionState;
    use std::thread;

    fn subscription(collection: &str) -> Arc<dyn Subscription> {
        Arc::new(CollectionSubscription::<serde_json::Value>::new(Some(
            collection.to_string(),
        )))
    }

    #[test]
    fn test_insert_remove() {
        let registry = Registry::new();
        let sub = subscription("users");
        let id = sub.id();

        assert!(registry.insert(Arc::clone(&sub)));
        assert!(!registry.insert(sub));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(id));

        assert!(registry.remove(id).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_same_collection_distinct_entries() {
        let registry = Registry::new();
        registry.insert(subscription("users"));
        registry.insert(subscription("users"));

        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_release_is_idempotent() {
        let registry = Arc::new(Registry::new());
        let sub = subscription("users");
        registry.insert(Arc::clone(&sub));

        let handle = Unsubscriber::new(Arc::clone(&registry), Arc::clone(&sub));
        assert!(handle.release());
        assert!(!handle.release());
        assert!(handle.is_released());
        assert!(registry.is_empty());
        assert_eq!(sub.state(), SubscriptionState::Unsubscribed);
    }

    #[test]
    fn test_concurrent_insert_and_iterate() {
        let registry = Arc::new(Registry::new());

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..250 {
                        let sub = subscription("users");
                        let id = sub.id();
                        registry.insert(sub);
                        if id.0 % 2 == 0 {
                            registry.remove(id);
                        }
                    }
                })
            })
            .collect();

        let reader = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for _ in 0..100 {
                    let _ = registry.entries().len();
                }
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        reader.join().unwrap();

        let remaining = registry.entries();
        assert!(remaining.iter().all(|sub| sub.id().0 % 2 == 1));
    }
}
