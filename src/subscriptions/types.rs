//! Subscription records shared between publisher-side and subscriber-side managers.

use crate::types::{Handler, HandlerResult, SubscriptionId, DEFAULT_PRIORITY};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

use super::manager::{self, ManagerInner};

/// Type-erased view of a subscription, as stored by subscriber-side managers.
pub trait SubscriptionEntry: Send + Sync {
    fn id(&self) -> SubscriptionId;

    /// Id of the entity that created the subscription.
    fn subscriber_id(&self) -> &str;

    /// Id of the publisher the subscription listens to.
    fn publisher_id(&self) -> &str;

    fn notification(&self) -> &str;

    /// Higher priorities are dispatched first.
    fn priority(&self) -> f64;

    /// False once the handler has been released.
    fn is_active(&self) -> bool;

    /// Remove the subscription from every manager indexing it and release its handler.
    fn unsubscribe(&self);

    /// Drop the handler closure so captured state can be reclaimed.
    fn release_handler(&self);
}

/// Back-references to the managers indexing a subscription.
struct Links<P> {
    publisher: Weak<ManagerInner<Subscription<P>>>,
    subscriber: Option<Weak<ManagerInner<dyn SubscriptionEntry>>>,
}

/// One handler bound to a (publisher, notification) pair.
///
/// The same record is indexed by the publisher's manager (for dispatch) and by
/// the subscriber's manager (for bulk removal). [`Subscription::unsubscribe`]
/// removes both index entries in one step.
pub struct Subscription<P> {
    id: SubscriptionId,
    subscriber_id: String,
    publisher_id: String,
    notification: String,
    priority: f64,
    handler: Mutex<Option<Handler<P>>>,
    links: Mutex<Links<P>>,
}

impl<P> Subscription<P> {
    /// Create a detached subscription with the default priority.
    ///
    /// It becomes live once added to a publisher through
    /// [`Publisher::add_subscriber`](crate::Publisher::add_subscriber).
    pub fn new<F>(
        id: SubscriptionId,
        subscriber_id: impl Into<String>,
        publisher_id: impl Into<String>,
        notification: impl Into<String>,
        handler: F,
    ) -> Self
    where
        F: Fn(&P) -> HandlerResult + Send + Sync + 'static,
    {
        let handler: Handler<P> = Arc::new(handler);
        Self {
            id,
            subscriber_id: subscriber_id.into(),
            publisher_id: publisher_id.into(),
            notification: notification.into(),
            priority: DEFAULT_PRIORITY,
            handler: Mutex::new(Some(handler)),
            links: Mutex::new(Links {
                publisher: Weak::new(),
                subscriber: None,
            }),
        }
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn subscriber_id(&self) -> &str {
        &self.subscriber_id
    }

    pub fn publisher_id(&self) -> &str {
        &self.publisher_id
    }

    pub fn notification(&self) -> &str {
        &self.notification
    }

    pub fn priority(&self) -> f64 {
        self.priority
    }

    pub fn is_active(&self) -> bool {
        self.handler.lock().is_some()
    }

    /// Clone of the handler, or None once released.
    pub(crate) fn handler(&self) -> Option<Handler<P>> {
        self.handler.lock().clone()
    }

    pub(crate) fn bind_publisher(&self, publisher: Weak<ManagerInner<Subscription<P>>>) {
        self.links.lock().publisher = publisher;
    }

    pub(crate) fn bind_subscriber(&self, subscriber: Weak<ManagerInner<dyn SubscriptionEntry>>) {
        self.links.lock().subscriber = Some(subscriber);
    }

    /// Remove this subscription from both the publisher's and the subscriber's
    /// manager, then release the handler. Safe to call more than once.
    pub fn unsubscribe(&self) {
        let (publisher, subscriber) = {
            let links = self.links.lock();
            (
                links.publisher.upgrade(),
                links.subscriber.as_ref().and_then(Weak::upgrade),
            )
        };

        manager::detach(self.id, publisher.as_deref(), subscriber.as_deref());
        self.release_handler();
    }

    pub fn release_handler(&self) {
        // Dropped outside the lock: the closure's destructor may touch other subscriptions.
        let handler = self.handler.lock().take();
        drop(handler);
    }
}

impl<P> SubscriptionEntry for Subscription<P> {
    fn id(&self) -> SubscriptionId {
        self.id
    }

    fn subscriber_id(&self) -> &str {
        &self.subscriber_id
    }

    fn publisher_id(&self) -> &str {
        &self.publisher_id
    }

    fn notification(&self) -> &str {
        &self.notification
    }

    fn priority(&self) -> f64 {
        self.priority
    }

    fn is_active(&self) -> bool {
        Subscription::is_active(self)
    }

    fn unsubscribe(&self) {
        Subscription::unsubscribe(self)
    }

    fn release_handler(&self) {
        Subscription::release_handler(self)
    }
}

impl<P> fmt::Debug for Subscription<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("subscriber_id", &self.subscriber_id)
            .field("publisher_id", &self.publisher_id)
            .field("notification", &self.notification)
            .field("priority", &self.priority)
            .field("active", &self.is_active())
            .finish()
    }
}
