//! Subscription manager: id and notification indexes over subscriptions.

use crate::error::{PubSubError, Result};
use crate::types::{Identifiable, SubscriptionId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::debug;

use super::types::SubscriptionEntry;

/// Indexes guarded by the manager lock.
struct ManagerState<S: ?Sized> {
    /// Subscription id -> notification name.
    subscriptions: HashMap<SubscriptionId, String>,
    /// Notification name -> bucket ordered by descending priority, then insertion.
    notifications: HashMap<String, Vec<Arc<S>>>,
    /// Maintained incrementally.
    count: usize,
}

impl<S: ?Sized + SubscriptionEntry> ManagerState<S> {
    fn new() -> Self {
        Self {
            subscriptions: HashMap::new(),
            notifications: HashMap::new(),
            count: 0,
        }
    }

    /// Position of a subscription as (notification, index in bucket).
    fn locate(&self, id: SubscriptionId) -> Option<(&str, usize)> {
        let notification = self.subscriptions.get(&id)?;
        let index = self
            .notifications
            .get(notification)?
            .iter()
            .position(|sub| sub.id() == id)?;
        Some((notification.as_str(), index))
    }

    /// Insert behind every entry of greater or equal priority. Returns false on
    /// id collision, leaving the state untouched.
    fn insert(&mut self, notification: &str, subscription: Arc<S>) -> bool {
        let id = subscription.id();
        if self.subscriptions.contains_key(&id) {
            return false;
        }

        let priority = subscription.priority();
        let bucket = self.notifications.entry(notification.to_string()).or_default();
        // Plain comparison keeps -0.0 and 0.0 tied.
        let at = bucket.partition_point(|sub| sub.priority() >= priority);
        bucket.insert(at, subscription);

        self.subscriptions.insert(id, notification.to_string());
        self.count += 1;
        true
    }

    /// Remove by the index resolved in `locate`. Empty buckets are dropped.
    fn remove(&mut self, id: SubscriptionId) -> Option<Arc<S>> {
        let (notification, index) = self.locate(id)?;
        let notification = notification.to_string();

        let bucket = self.notifications.get_mut(&notification)?;
        let removed = bucket.remove(index);
        if bucket.is_empty() {
            self.notifications.remove(&notification);
        }

        self.subscriptions.remove(&id);
        self.count -= 1;
        Some(removed)
    }
}

/// Shared manager storage, referenced weakly by the subscriptions it indexes.
pub(crate) struct ManagerInner<S: ?Sized> {
    id: String,
    state: Mutex<ManagerState<S>>,
}

/// Remove one subscription from a publisher-side and a subscriber-side manager
/// as a single step.
///
/// Lock order is always publisher-side first. Removed records are dropped only
/// after both locks are released.
pub(crate) fn detach<A, B>(
    id: SubscriptionId,
    publisher: Option<&ManagerInner<A>>,
    subscriber: Option<&ManagerInner<B>>,
) where
    A: ?Sized + SubscriptionEntry,
    B: ?Sized + SubscriptionEntry,
{
    let (from_publisher, from_subscriber) = {
        let mut publisher_state = publisher.map(|m| m.state.lock());
        let mut subscriber_state = subscriber.map(|m| m.state.lock());
        (
            publisher_state.as_mut().and_then(|s| s.remove(id)),
            subscriber_state.as_mut().and_then(|s| s.remove(id)),
        )
    };

    if from_publisher.is_some() || from_subscriber.is_some() {
        debug!(
            subscription = %id,
            publisher = publisher.map(|m| m.id.as_str()),
            subscriber = subscriber.map(|m| m.id.as_str()),
            "Subscription detached"
        );
    }
}

/// Indexes subscriptions by id and by notification name.
///
/// Cloning yields another handle to the same indexes.
pub struct SubscriptionManager<S: ?Sized> {
    inner: Arc<ManagerInner<S>>,
}

impl<S: ?Sized + SubscriptionEntry> SubscriptionManager<S> {
    /// Create an empty manager.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                id: id.into(),
                state: Mutex::new(ManagerState::new()),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<ManagerInner<S>> {
        Arc::downgrade(&self.inner)
    }

    pub fn has_subscription(&self, id: SubscriptionId) -> bool {
        self.inner.state.lock().subscriptions.contains_key(&id)
    }

    /// All subscriptions. Order across notifications is unspecified; within a
    /// notification it follows dispatch order.
    pub fn subscriptions(&self) -> Vec<Arc<S>> {
        self.inner
            .state
            .lock()
            .notifications
            .values()
            .flat_map(|bucket| bucket.iter().cloned())
            .collect()
    }

    pub fn nb_subscriptions(&self) -> usize {
        self.inner.state.lock().count
    }

    /// Copy of the bucket for `notification`, in dispatch order. Empty when the
    /// notification has no subscriptions.
    pub fn find_subscriptions_by_notification(&self, notification: &str) -> Vec<Arc<S>> {
        self.inner
            .state
            .lock()
            .notifications
            .get(notification)
            .cloned()
            .unwrap_or_default()
    }

    pub fn find_subscription_by_id(&self, id: SubscriptionId) -> Option<Arc<S>> {
        let state = self.inner.state.lock();
        let (notification, index) = state.locate(id)?;
        state
            .notifications
            .get(notification)
            .and_then(|bucket| bucket.get(index))
            .cloned()
    }

    /// Subscriptions matching `predicate`, across every notification.
    pub(crate) fn filter<F>(&self, predicate: F) -> Vec<Arc<S>>
    where
        F: Fn(&S) -> bool,
    {
        self.inner
            .state
            .lock()
            .notifications
            .values()
            .flat_map(|bucket| bucket.iter())
            .filter(|sub| predicate(sub))
            .cloned()
            .collect()
    }

    /// Run `f` over the bucket for `notification` while holding the manager lock.
    /// Returns None when the notification has no subscriptions.
    pub(crate) fn with_bucket<R, F>(&self, notification: &str, f: F) -> Option<R>
    where
        F: FnOnce(&[Arc<S>]) -> R,
    {
        let state = self.inner.state.lock();
        state.notifications.get(notification).map(|bucket| f(bucket))
    }

    /// Index a subscription under `notification`.
    ///
    /// Fails with [`PubSubError::SubscriptionAlreadyExists`] when the id is already
    /// present, whatever notification it is attached to.
    pub(crate) fn add_subscription(&self, notification: &str, subscription: Arc<S>) -> Result<()> {
        let id = subscription.id();
        if !self.inner.state.lock().insert(notification, subscription) {
            return Err(PubSubError::SubscriptionAlreadyExists {
                subscription: id,
                manager: self.inner.id.clone(),
            });
        }
        Ok(())
    }

    /// Remove a subscription from this manager only and release its handler.
    ///
    /// Other managers indexing the same subscription are left untouched; prefer
    /// [`SubscriptionEntry::unsubscribe`] unless that is the intent.
    pub fn clear_subscription(&self, id: SubscriptionId) -> Result<()> {
        let removed = self.inner.state.lock().remove(id);
        match removed {
            Some(subscription) => {
                subscription.release_handler();
                Ok(())
            }
            None => Err(PubSubError::SubscriptionNotFound {
                subscription: id,
                manager: self.inner.id.clone(),
            }),
        }
    }

    /// Unsubscribe every subscription held, leaving the manager empty.
    pub fn destroy(&self) {
        let snapshot = self.subscriptions();
        debug!(manager = %self.inner.id, count = snapshot.len(), "Destroying subscriptions");

        for subscription in snapshot {
            subscription.unsubscribe();
            // Records never bound to this manager cannot remove themselves.
            let unbound = self.inner.state.lock().remove(subscription.id());
            if let Some(unbound) = unbound {
                unbound.release_handler();
            }
        }
    }
}

impl<S: ?Sized> Identifiable for SubscriptionManager<S> {
    fn id(&self) -> &str {
        &self.inner.id
    }
}

impl<S: ?Sized> Clone for SubscriptionManager<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
