//! Subscription variants.

use crate::error::{NotifyError, Result};
use crate::notifications::{CacheSnapshot, Delivery, DispatchUnit};
use crate::store::CollectionHandle;
use crate::types::{Document, DocumentKey, SubscriptionId, SubscriptionKind, SubscriptionState};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Callback receiving refreshed values.
pub type Observer<V> = Box<dyn Fn(V) + Send + Sync>;

/// Value delivered to raw collection observers.
pub type RawCollection = Arc<dyn CollectionHandle>;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static IN_OBSERVER: Cell<bool> = const { Cell::new(false) };
}

/// Flags the current thread as running an observer until dropped.
struct ObserverScope;

impl ObserverScope {
    fn enter() -> Self {
        IN_OBSERVER.with(|flag| flag.set(true));
        ObserverScope
    }
}

impl Drop for ObserverScope {
    fn drop(&mut self) {
        IN_OBSERVER.with(|flag| flag.set(false));
    }
}

pub(crate) mod sealed {
    use crate::error::Result;
    use crate::store::CollectionHandle;
    use std::sync::Arc;

    /// Lifecycle transitions only the service and [`Unsubscriber`] drive.
    ///
    /// [`Unsubscriber`]: crate::subscriptions::Unsubscriber
    pub trait SubscriptionControl {
        /// Attach the collection handle resolved at registration. Only once.
        fn bind(&self, handle: Arc<dyn CollectionHandle>) -> Result<()>;

        /// Move to the terminal state. Pending units become no-ops, and an
        /// observer call in progress on another thread has returned when this
        /// does.
        fn mark_unsubscribed(&self);
    }
}

pub(crate) use sealed::SubscriptionControl;

/// Behaviour shared by every subscription variant, as seen by the service.
///
/// Implemented by the three variants in this crate only.
pub trait Subscription: SubscriptionControl + Send + Sync {
    fn id(&self) -> SubscriptionId;

    fn kind(&self) -> SubscriptionKind;

    /// Collection of interest. `None` until fully specified.
    fn collection(&self) -> Option<&str>;

    fn state(&self) -> SubscriptionState;

    /// Whether the snapshot holds a change this subscription must see.
    fn is_relevant(&self, snapshot: &CacheSnapshot) -> bool;

    /// Build the unit that re-fetches the value and delivers it.
    ///
    /// Fails with `NotInitialized` if the subscription was never bound.
    fn dispatch_unit(self: Arc<Self>) -> Result<DispatchUnit>;
}

/// State common to all variants.
struct SubscriptionCore<V> {
    id: SubscriptionId,
    collection: Option<String>,
    handle: OnceLock<Arc<dyn CollectionHandle>>,
    observer: OnceLock<Observer<V>>,
    unsubscribed: AtomicBool,
    /// Held shared while the observer runs, exclusively by `unsubscribe`.
    delivering: RwLock<()>,
}

impl<V> SubscriptionCore<V> {
    fn new(collection: Option<String>) -> Self {
        Self {
            id: SubscriptionId(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed)),
            collection,
            handle: OnceLock::new(),
            observer: OnceLock::new(),
            unsubscribed: AtomicBool::new(false),
            delivering: RwLock::new(()),
        }
    }

    fn is_unsubscribed(&self) -> bool {
        self.unsubscribed.load(Ordering::Acquire)
    }

    /// Enter the terminal state and wait for a running observer to return.
    ///
    /// From inside an observer the wait is skipped, so an observer may release
    /// any subscription, its own included, without deadlocking.
    fn unsubscribe(&self) {
        self.unsubscribed.store(true, Ordering::Release);
        if !IN_OBSERVER.with(Cell::get) {
            drop(self.delivering.write());
        }
    }

    fn state(&self) -> SubscriptionState {
        if self.is_unsubscribed() {
            SubscriptionState::Unsubscribed
        } else if self.handle.get().is_none() {
            SubscriptionState::Unbound
        } else if self.observer.get().is_none() {
            SubscriptionState::Bound
        } else {
            SubscriptionState::Observing
        }
    }

    fn bind(&self, handle: Arc<dyn CollectionHandle>) -> Result<()> {
        if self.is_unsubscribed() {
            return Err(NotifyError::Unsubscribed(self.id));
        }
        self.handle
            .set(handle)
            .map_err(|_| NotifyError::AlreadyBound(self.id))
    }

    fn attach_observer(&self, observer: Observer<V>) -> Result<()> {
        if self.is_unsubscribed() {
            return Err(NotifyError::Unsubscribed(self.id));
        }
        self.observer
            .set(observer)
            .map_err(|_| NotifyError::ObserverAlreadyAttached(self.id))
    }

    fn bound_handle(&self) -> Result<&Arc<dyn CollectionHandle>> {
        self.handle.get().ok_or(NotifyError::NotInitialized)
    }

    /// Materialize and hand the value to the observer, unless there is
    /// nobody to hand it to.
    fn deliver_with<F>(&self, materialize: F) -> Result<Delivery>
    where
        F: FnOnce(&Arc<dyn CollectionHandle>) -> Result<V>,
    {
        let handle = self.bound_handle()?;
        let observer = match self.observer.get() {
            Some(observer) if !self.is_unsubscribed() => observer,
            _ => return Ok(Delivery::Skipped),
        };
        let value = materialize(handle)?;

        let _delivering = self.delivering.read();
        if self.is_unsubscribed() {
            return Ok(Delivery::Skipped);
        }
        let _scope = ObserverScope::enter();
        observer(value);
        Ok(Delivery::Delivered)
    }
}

fn decode_all<T: DeserializeOwned>(documents: Vec<Document>) -> Result<Vec<T>> {
    documents.iter().map(Document::decode).collect()
}

/// Refreshed with every document of a collection, decoded as `T`.
pub struct CollectionSubscription<T> {
    core: SubscriptionCore<Vec<T>>,
}

impl<T> CollectionSubscription<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Unbound subscription on `collection`; `None` leaves it unnamed.
    pub fn new(collection: Option<String>) -> Self {
        Self {
            core: SubscriptionCore::new(collection),
        }
    }

    /// Set the callback receiving refreshed values. Only once.
    pub fn attach_observer<F>(&self, observer: F) -> Result<()>
    where
        F: Fn(Vec<T>) + Send + Sync + 'static,
    {
        self.core.attach_observer(Box::new(observer))
    }

    /// Whether an observer has been attached.
    pub fn has_observer(&self) -> bool {
        self.core.observer.get().is_some()
    }

    fn deliver(&self) -> Result<Delivery> {
        self.core.deliver_with(|handle| decode_all(handle.query_all()?))
    }
}

impl<T> SubscriptionControl for CollectionSubscription<T>
where
    T: DeserializeOwned + Send + 'static, {
    fn bind(&self, handle: Arc<dyn CollectionHandle>) -> Result<()> {
        self.core.bind(handle)
    }

    fn mark_unsubscribed(&self) {
        self.core.unsubscribe();
    }
}

impl<T> Subscription for CollectionSubscription<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn id(&self) -> SubscriptionId {
        self.core.id
    }

    fn kind(&self) -> SubscriptionKind {
        SubscriptionKind::Collection
    }

    fn collection(&self) -> Option<&str> {
        self.core.collection.as_deref()
    }

    fn state(&self) -> SubscriptionState {
        self.core.state()
    }

    fn is_relevant(&self, snapshot: &CacheSnapshot) -> bool {
        match self.collection() {
            Some(collection) if !self.core.is_unsubscribed() => {
                snapshot.matches_collection(collection)
            }
            _ => false,
        }
    }

    fn dispatch_unit(self: Arc<Self>) -> Result<DispatchUnit> {
        self.core.bound_handle()?;
        let id = self.core.id;
        Ok(DispatchUnit::new(id, move || self.deliver()))
    }
}

/// Refreshed with the collection handle itself; the observer queries it.
pub struct CollectionRawSubscription {
    core: SubscriptionCore<RawCollection>,
}

impl CollectionRawSubscription {
    /// Unbound subscription on `collection`; `None` leaves it unnamed.
    pub fn new(collection: Option<String>) -> Self {
        Self {
            core: SubscriptionCore::new(collection),
        }
    }

    /// Set the callback receiving refreshed values. Only once.
    pub fn attach_observer<F>(&self, observer: F) -> Result<()>
    where
        F: Fn(RawCollection) + Send + Sync + 'static,
    {
        self.core.attach_observer(Box::new(observer))
    }

    /// Whether an observer has been attached.
    pub fn has_observer(&self) -> bool {
        self.core.observer.get().is_some()
    }

    fn deliver(&self) -> Result<Delivery> {
        self.core.deliver_with(|handle| Ok(Arc::clone(handle)))
    }
}

impl SubscriptionControl for CollectionRawSubscription {
    fn bind(&self, handle: Arc<dyn CollectionHandle>) -> Result<()> {
        self.core.bind(handle)
    }

    fn mark_unsubscribed(&self) {
        self.core.unsubscribe();
    }
}

impl Subscription for CollectionRawSubscription {
    fn id(&self) -> SubscriptionId {
        self.core.id
    }

    fn kind(&self) -> SubscriptionKind {
        SubscriptionKind::CollectionRaw
    }

    fn collection(&self) -> Option<&str> {
        self.core.collection.as_deref()
    }

    fn state(&self) -> SubscriptionState {
        self.core.state()
    }

    fn is_relevant(&self, snapshot: &CacheSnapshot) -> bool {
        match self.collection() {
            Some(collection) if !self.core.is_unsubscribed() => {
                snapshot.matches_collection(collection)
            }
            _ => false,
        }
    }

    fn dispatch_unit(self: Arc<Self>) -> Result<DispatchUnit> {
        self.core.bound_handle()?;
        let id = self.core.id;
        Ok(DispatchUnit::new(id, move || self.deliver()))
    }
}

/// Refreshed with one document, decoded as `T`.
///
/// The observer receives `None` when the key no longer resolves.
pub struct DocumentSubscription<T> {
    core: SubscriptionCore<Option<T>>,
    key: DocumentKey,
}

impl<T> DocumentSubscription<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Unbound subscription on the document `key` of `collection`.
    pub fn new(collection: Option<String>, key: impl Into<DocumentKey>) -> Self {
        Self {
            core: SubscriptionCore::new(collection),
            key: key.into(),
        }
    }

    /// Key of the observed document.
    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    /// Set the callback receiving refreshed values. Only once.
    pub fn attach_observer<F>(&self, observer: F) -> Result<()>
    where
        F: Fn(Option<T>) + Send + Sync + 'static,
    {
        self.core.attach_observer(Box::new(observer))
    }

    /// Whether an observer has been attached.
    pub fn has_observer(&self) -> bool {
        self.core.observer.get().is_some()
    }

    fn deliver(&self) -> Result<Delivery> {
        self.core.deliver_with(|handle| {
            handle
                .find_by_key(&self.key)?
                .map(|document| document.decode())
                .transpose()
        })
    }
}

impl<T> SubscriptionControl for DocumentSubscription<T>
where
    T: DeserializeOwned + Send + 'static, {
    fn bind(&self, handle: Arc<dyn CollectionHandle>) -> Result<()> {
        self.core.bind(handle)
    }

    fn mark_unsubscribed(&self) {
        self.core.unsubscribe();
    }
}

impl<T> Subscription for DocumentSubscription<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn id(&self) -> SubscriptionId {
        self.core.id
    }

    fn kind(&self) -> SubscriptionKind {
        SubscriptionKind::Document
    }

    fn collection(&self) -> Option<&str> {
        self.core.collection.as_deref()
    }

    fn state(&self) -> SubscriptionState {
        self.core.state()
    }

    fn is_relevant(&self, snapshot: &CacheSnapshot) -> bool {
        match self.collection() {
            Some(collection) if !self.core.is_unsubscribed() => {
                snapshot.matches_document(collection, &self.key)
            }
            _ => false,
        }
    }

    fn dispatch_unit(self: Arc<Self>) -> Result<DispatchUnit> {
        self.core.bound_handle()?;
        let id = self.core.id;
        Ok(DispatchUnit::new(id, move || self.deliver()))
    }
}
