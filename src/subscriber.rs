//! Subscriber: creates subscriptions on publishers and tracks them for bulk removal.

use crate::error::{PubSubError, Result};
use crate::publisher::Publisher;
use crate::subscriptions::{Subscription, SubscriptionEntry, SubscriptionManager};
use crate::types::{HandlerResult, Identifiable, SubscriptionId, DEFAULT_PRIORITY};
use crate::wait::{WaitHandle, WaitRecord};
use std::sync::Arc;
use tracing::debug;

/// Subscribes to publishers and keeps its own index of what it subscribed to.
///
/// Cloning yields another handle to the same subscriber.
#[derive(Clone)]
pub struct Subscriber {
    manager: SubscriptionManager<dyn SubscriptionEntry>,
}

impl Subscriber {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            manager: SubscriptionManager::new(id),
        }
    }

    /// Subscribe to `notification` on `publisher` with the default priority.
    pub fn subscribe<P, F>(
        &self,
        publisher: &Publisher<P>,
        notification: &str,
        handler: F,
    ) -> Result<Arc<Subscription<P>>>
    where
        P: 'static,
        F: Fn(&P) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe_with_priority(publisher, notification, handler, DEFAULT_PRIORITY)
    }

    /// Subscribe to `notification` on `publisher`. Higher priorities run first.
    ///
    /// The subscription is indexed by both the publisher and this subscriber.
    /// Fails with [`PubSubError::InvalidArgument`] when `priority` is NaN.
    pub fn subscribe_with_priority<P, F>(
        &self,
        publisher: &Publisher<P>,
        notification: &str,
        handler: F,
        priority: f64,
    ) -> Result<Arc<Subscription<P>>>
    where
        P: 'static,
        F: Fn(&P) -> HandlerResult + Send + Sync + 'static,
    {
        if priority.is_nan() {
            return Err(PubSubError::InvalidArgument(format!(
                "priority for '{}' must be a number",
                notification
            )));
        }

        let subscription = Arc::new(
            Subscription::new(
                SubscriptionId::next(),
                self.id(),
                publisher.id(),
                notification,
                handler,
            )
            .with_priority(priority),
        );

        publisher.add_subscriber(notification, Arc::clone(&subscription))?;
        if let Err(e) = self.add_subscription(notification, Arc::clone(&subscription)) {
            subscription.unsubscribe();
            return Err(e);
        }

        debug!(
            subscriber = %self.id(),
            publisher = %publisher.id(),
            notification,
            subscription = %subscription.id(),
            priority,
            "Subscribed"
        );
        Ok(subscription)
    }

    /// Subscribe for a single delivery; the subscription removes itself after
    /// the first publication. The handle resolves with that payload.
    pub fn subscribe_once<P, F>(
        &self,
        publisher: &Publisher<P>,
        notification: &str,
        handler: F,
    ) -> Result<WaitHandle<P>>
    where
        P: Clone + Send + 'static,
        F: Fn(&P) + Send + Sync + 'static,
    {
        self.wait_until(vec![WaitRecord::new(publisher, notification).with_handler(handler)])
    }

    /// Resolve once every record's notification has been published at least once.
    ///
    /// Each record gets its own one-shot subscription, even when the same
    /// publisher and notification appear more than once. Payloads are returned
    /// in record order, whatever order they fired in.
    pub fn wait_until<P>(&self, records: Vec<WaitRecord<'_, P>>) -> Result<WaitHandle<P>>
    where
        P: Clone + Send + 'static,
    {
        WaitHandle::register(self, records)
    }

    /// Unsubscribe a single subscription. Unknown ids are ignored.
    pub fn unsubscribe_from_subscription_id(&self, id: SubscriptionId) {
        if let Some(subscription) = self.manager.find_subscription_by_id(id) {
            subscription.unsubscribe();
        }
    }

    /// Unsubscribe everything this subscriber holds on `publisher_id`.
    pub fn unsubscribe_from_publisher_id(&self, publisher_id: &str) {
        let subscriptions = self.find_subscription_by_publisher_id(publisher_id);
        debug!(
            subscriber = %self.id(),
            publisher = publisher_id,
            count = subscriptions.len(),
            "Unsubscribing from publisher"
        );
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
    }

    /// Unsubscribe everything this subscriber holds on `notification`, whatever the publisher.
    pub fn unsubscribe_from_notification(&self, notification: &str) {
        for subscription in self.manager.find_subscriptions_by_notification(notification) {
            subscription.unsubscribe();
        }
    }

    pub fn find_subscription_by_publisher_id(&self, publisher_id: &str) -> Vec<Arc<dyn SubscriptionEntry>> {
        self.manager.filter(|sub| sub.publisher_id() == publisher_id)
    }

    pub fn find_subscriptions_by_notification_and_publisher_id(
        &self,
        notification: &str,
        publisher_id: &str,
    ) -> Vec<Arc<dyn SubscriptionEntry>> {
        self.manager
            .find_subscriptions_by_notification(notification)
            .into_iter()
            .filter(|sub| sub.publisher_id() == publisher_id)
            .collect()
    }

    /// Record a subscription locally, binding it to this subscriber.
    ///
    /// Does not touch any publisher; [`subscribe`](Self::subscribe) is the
    /// normal entry point.
    pub fn add_subscription<P: 'static>(
        &self,
        notification: &str,
        subscription: Arc<Subscription<P>>,
    ) -> Result<()> {
        let entry: Arc<dyn SubscriptionEntry> = subscription.clone();
        self.manager.add_subscription(notification, entry)?;
        subscription.bind_subscriber(self.manager.downgrade());
        Ok(())
    }

    /// Remove a subscription from this subscriber's index only.
    ///
    /// The publisher keeps delivering to it and the handler is released, so the
    /// two sides fall out of sync. Use
    /// [`unsubscribe_from_subscription_id`](Self::unsubscribe_from_subscription_id)
    /// instead unless that is the intent.
    pub fn remove_subscription(&self, id: SubscriptionId) -> Result<()> {
        self.manager.clear_subscription(id)
    }

    pub fn has_subscription(&self, id: SubscriptionId) -> bool {
        self.manager.has_subscription(id)
    }

    pub fn subscriptions(&self) -> Vec<Arc<dyn SubscriptionEntry>> {
        self.manager.subscriptions()
    }

    pub fn nb_subscriptions(&self) -> usize {
        self.manager.nb_subscriptions()
    }

    pub fn find_subscriptions_by_notification(&self, notification: &str) -> Vec<Arc<dyn SubscriptionEntry>> {
        self.manager.find_subscriptions_by_notification(notification)
    }

    pub fn find_subscription_by_id(&self, id: SubscriptionId) -> Option<Arc<dyn SubscriptionEntry>> {
        self.manager.find_subscription_by_id(id)
    }

    pub fn clear_subscription(&self, id: SubscriptionId) -> Result<()> {
        self.manager.clear_subscription(id)
    }

    /// Unsubscribe everything, detaching each subscription from its publisher too.
    pub fn destroy(&self) {
        self.manager.destroy();
    }
}

impl Identifiable for Subscriber {
    fn id(&self) -> &str {
        self.manager.id()
    }
}
