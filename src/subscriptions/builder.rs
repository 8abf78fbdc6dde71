//! Fluent construction of subscriptions.
//!
//! ```ignore
//! let unsubscriber = service
//!     .builder()
//!     .collection::<User>("users")
//!     .id(42)
//!     .subscribe(|user| println!("{:?}", user))?;
//! ```

use super::registry::Unsubscriber;
use super::types::{
    CollectionRawSubscription, CollectionSubscription, DocumentSubscription, RawCollection,
    Subscription,
};
use crate::error::Result;
use crate::notifications::NotificationService;
use crate::types::DocumentKey;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Entry point returned by [`NotificationService::builder`].
pub struct SubscriptionBuilder<'a> {
    service: &'a NotificationService,
}

impl<'a> SubscriptionBuilder<'a> {
    pub(crate) fn new(service: &'a NotificationService) -> Self {
        Self { service }
    }

    /// Start a subscription on the named collection.
    pub fn collection<T>(self, name: impl Into<String>) -> CollectionSubscriptionBuilder<'a, T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        CollectionSubscriptionBuilder {
            service: self.service,
            subscription: Arc::new(CollectionSubscription::new(Some(name.into()))),
        }
    }

    /// Start a subscription whose collection is not known yet.
    ///
    /// Such a subscription cannot be registered.
    pub fn unnamed<T>(self) -> CollectionSubscriptionBuilder<'a, T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        CollectionSubscriptionBuilder {
            service: self.service,
            subscription: Arc::new(CollectionSubscription::new(None)),
        }
    }
}

/// Builder for a whole-collection subscription.
pub struct CollectionSubscriptionBuilder<'a, T> {
    service: &'a NotificationService,
    subscription: Arc<CollectionSubscription<T>>,
}

impl<'a, T> CollectionSubscriptionBuilder<'a, T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// The subscription being built, not yet registered.
    pub fn subscription(&self) -> &Arc<CollectionSubscription<T>> {
        &self.subscription
    }

    /// Observe the collection handle instead of its decoded contents.
    pub fn raw(self) -> CollectionRawSubscriptionBuilder<'a> {
        CollectionRawSubscriptionBuilder {
            service: self.service,
            subscription: Arc::new(CollectionRawSubscription::new(
                self.subscription.collection().map(str::to_string),
            )),
        }
    }

    /// Narrow to a single document.
    pub fn id(self, key: impl Into<DocumentKey>) -> DocumentSubscriptionBuilder<'a, T> {
        DocumentSubscriptionBuilder {
            service: self.service,
            subscription: Arc::new(DocumentSubscription::new(
                self.subscription.collection().map(str::to_string),
                key,
            )),
        }
    }

    /// Register the subscription, then attach `observer`.
    pub fn subscribe<F>(self, observer: F) -> Result<Unsubscriber>
    where
        F: Fn(Vec<T>) + Send + Sync + 'static,
    {
        let unsubscriber = self.service.register(self.subscription.clone())?;
        if let Err(e) = self.subscription.attach_observer(observer) {
            unsubscriber.release();
            return Err(e);
        }
        Ok(unsubscriber)
    }
}

/// Builder for a raw collection subscription.
pub struct CollectionRawSubscriptionBuilder<'a> {
    service: &'a NotificationService,
    subscription: Arc<CollectionRawSubscription>,
}

impl<'a> CollectionRawSubscriptionBuilder<'a> {
    /// The subscription being built, not yet registered.
    pub fn subscription(&self) -> &Arc<CollectionRawSubscription> {
        &self.subscription
    }

    /// Register the subscription, then attach `observer`.
    pub fn subscribe<F>(self, observer: F) -> Result<Unsubscriber>
    where
        F: Fn(RawCollection) + Send + Sync + 'static,
    {
        let unsubscriber = self.service.register(self.subscription.clone())?;
        if let Err(e) = self.subscription.attach_observer(observer) {
            unsubscriber.release();
            return Err(e);
        }
        Ok(unsubscriber)
    }
}

/// Builder for a single-document subscription.
pub struct DocumentSubscriptionBuilder<'a, T> {
    service: &'a NotificationService,
    subscription: Arc<DocumentSubscription<T>>,
}

impl<'a, T> DocumentSubscriptionBuilder<'a, T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// The subscription being built, not yet registered.
    pub fn subscription(&self) -> &Arc<DocumentSubscription<T>> {
        &self.subscription
    }

    /// Register the subscription, then attach `observer`.
    pub fn subscribe<F>(self, observer: F) -> Result<Unsubscriber>
    where
        F: Fn(Option<T>) + Send + Sync + 'static,
    {
        let unsubscriber = self.service.register(self.subscription.clone())?;
        if let Err(e) = self.subscription.attach_observer(observer) {
            unsubscriber.release();
            return Err(e);
        }
        Ok(unsubscriber)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotifyError;
    use crate::notifications::NotificationConfig;
    use crate::store::MemoryStore;
    use crate::types::{SubscriptionKind, SubscriptionState};

    #[derive(serde::Deserialize)]
    struct Model {}

    fn service() -> NotificationService {
        let service = NotificationService::new(NotificationConfig::default()).unwrap();
        service.initialize(Arc::new(MemoryStore::new()));
        service
    }

    #[test]
    fn test_collection_builder() {
        let service = service();

        let unnamed = service.builder().unnamed::<Model>();
        assert_eq!(unnamed.subscription().collection(), None);

        let builder = service.builder().collection::<Model>("testCollection");
        let sub = Arc::clone(builder.subscription());
        assert_eq!(sub.collection(), Some("testCollection"));
        assert_eq!(sub.kind(), SubscriptionKind::Collection);
        assert!(!sub.has_observer());

        let unsubscriber = builder.subscribe(|_models| {}).unwrap();
        assert!(sub.has_observer());
        assert_eq!(sub.state(), SubscriptionState::Observing);
        assert_eq!(unsubscriber.id(), sub.id());
    }

    #[test]
    fn test_document_builder() {
        let service = service();

        let unnamed = service.builder().unnamed::<Model>().id("some-id");
        assert_eq!(unnamed.subscription().collection(), None);

        let builder = service.builder().collection::<Model>("testCollection").id("some-id");
        let sub = Arc::clone(builder.subscription());
        assert_eq!(sub.collection(), Some("testCollection"));
        assert_eq!(sub.key(), &DocumentKey::from("some-id"));
        assert_eq!(sub.kind(), SubscriptionKind::Document);
        assert!(!sub.has_observer());

        let _unsubscriber = builder.subscribe(|_model| {}).unwrap();
        assert!(sub.has_observer());
    }

    #[test]
    fn test_raw_builder() {
        let service = service();

        let builder = service.builder().collection::<Model>("testCollection").raw();
        let sub = Arc::clone(builder.subscription());
        assert_eq!(sub.kind(), SubscriptionKind::CollectionRaw);
        assert_eq!(sub.collection(), Some("testCollection"));

        let _unsubscriber = builder.subscribe(|_handle| {}).unwrap();
        assert!(sub.has_observer());
    }

    #[test]
    fn test_unnamed_cannot_subscribe() {
        let service = service();

        let result = service.builder().unnamed::<Model>().subscribe(|_| {});
        assert!(matches!(result, Err(NotifyError::IncompleteSubscription)));
        assert_eq!(service.subscription_count(), 0);
    }
}
