//! An entity that both publishes and subscribes under a single id.

use crate::error::Result;
use crate::publisher::Publisher;
use crate::subscriber::Subscriber;
use crate::subscriptions::{Subscription, SubscriptionEntry};
use crate::types::{ExceptionPolicy, HandlerResult, Identifiable, PublisherConfig, SubscriptionId};
use crate::wait::{WaitHandle, WaitRecord};
use std::sync::Arc;

/// A [`Publisher`] and a [`Subscriber`] sharing one id.
///
/// Publish-side calls go to the publisher, subscribe-side calls to the
/// subscriber. Queries that both roles offer (`has_subscription`,
/// `find_subscription_by_id`, ...) answer for the subscriber role; use
/// [`publisher`](Self::publisher) for the other side.
pub struct PublisherSubscriber<P> {
    publisher: Publisher<P>,
    subscriber: Subscriber,
}

impl<P: 'static> PublisherSubscriber<P> {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_config(id, PublisherConfig::default())
    }

    pub fn with_config(id: impl Into<String>, config: PublisherConfig) -> Self {
        let id = id.into();
        Self {
            publisher: Publisher::with_config(id.clone(), config),
            subscriber: Subscriber::new(id),
        }
    }

    /// The publishing role, for others to subscribe to.
    pub fn publisher(&self) -> &Publisher<P> {
        &self.publisher
    }

    /// The subscribing role.
    pub fn subscriber(&self) -> &Subscriber {
        &self.subscriber
    }

    pub fn nb_subscriptions_as_publisher(&self) -> usize {
        self.publisher.nb_subscriptions()
    }

    pub fn nb_subscriptions_as_subscriber(&self) -> usize {
        self.subscriber.nb_subscriptions()
    }

    /// Subscriber-side count.
    #[deprecated(note = "ambiguous; use nb_subscriptions_as_subscriber or nb_subscriptions_as_publisher")]
    pub fn nb_subscriptions(&self) -> usize {
        self.nb_subscriptions_as_subscriber()
    }

    // --- Publisher role ---

    pub fn publish(&self, notification: &str, payload: P) -> Result<()> {
        self.publisher.publish(notification, payload)
    }

    pub fn add_subscriber(&self, notification: &str, subscription: Arc<Subscription<P>>) -> Result<()> {
        self.publisher.add_subscriber(notification, subscription)
    }

    pub fn remove_subscriber(&self, subscriber_id: &str) {
        self.publisher.remove_subscriber(subscriber_id)
    }

    pub fn find_subscription_by_subscriber_id(&self, subscriber_id: &str) -> Vec<Arc<Subscription<P>>> {
        self.publisher.find_subscription_by_subscriber_id(subscriber_id)
    }

    pub fn find_subscriptions_by_notification_and_subscriber_id(
        &self,
        notification: &str,
        subscriber_id: &str,
    ) -> Vec<Arc<Subscription<P>>> {
        self.publisher
            .find_subscriptions_by_notification_and_subscriber_id(notification, subscriber_id)
    }

    pub fn stop_publication_on_exception(&self) {
        self.publisher.stop_publication_on_exception()
    }

    pub fn continue_publication_on_exception(&self) {
        self.publisher.continue_publication_on_exception()
    }

    pub fn exception_policy(&self) -> ExceptionPolicy {
        self.publisher.exception_policy()
    }

    // --- Subscriber role ---

    pub fn subscribe<Q, F>(&self, publisher: &Publisher<Q>, notification: &str, handler: F) -> Result<Arc<Subscription<Q>>>
    where
        Q: 'static,
        F: Fn(&Q) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscriber.subscribe(publisher, notification, handler)
    }

    pub fn subscribe_with_priority<Q, F>(
        &self,
        publisher: &Publisher<Q>,
        notification: &str,
        handler: F,
        priority: f64,
    ) -> Result<Arc<Subscription<Q>>>
    where
        Q: 'static,
        F: Fn(&Q) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscriber
            .subscribe_with_priority(publisher, notification, handler, priority)
    }

    pub fn subscribe_once<Q, F>(&self, publisher: &Publisher<Q>, notification: &str, handler: F) -> Result<WaitHandle<Q>>
    where
        Q: Clone + Send + 'static,
        F: Fn(&Q) + Send + Sync + 'static,
    {
        self.subscriber.subscribe_once(publisher, notification, handler)
    }

    pub fn wait_until<Q>(&self, records: Vec<WaitRecord<'_, Q>>) -> Result<WaitHandle<Q>>
    where
        Q: Clone + Send + 'static,
    {
        self.subscriber.wait_until(records)
    }

    pub fn unsubscribe_from_subscription_id(&self, id: SubscriptionId) {
        self.subscriber.unsubscribe_from_subscription_id(id)
    }

    pub fn unsubscribe_from_publisher_id(&self, publisher_id: &str) {
        self.subscriber.unsubscribe_from_publisher_id(publisher_id)
    }

    pub fn unsubscribe_from_notification(&self, notification: &str) {
        self.subscriber.unsubscribe_from_notification(notification)
    }

    pub fn find_subscription_by_publisher_id(&self, publisher_id: &str) -> Vec<Arc<dyn SubscriptionEntry>> {
        self.subscriber.find_subscription_by_publisher_id(publisher_id)
    }

    pub fn find_subscriptions_by_notification_and_publisher_id(
        &self,
        notification: &str,
        publisher_id: &str,
    ) -> Vec<Arc<dyn SubscriptionEntry>> {
        self.subscriber
            .find_subscriptions_by_notification_and_publisher_id(notification, publisher_id)
    }

    pub fn add_subscription<Q: 'static>(&self, notification: &str, subscription: Arc<Subscription<Q>>) -> Result<()> {
        self.subscriber.add_subscription(notification, subscription)
    }

    pub fn remove_subscription(&self, id: SubscriptionId) -> Result<()> {
        self.subscriber.remove_subscription(id)
    }

    // --- Shared queries (subscriber role) ---

    pub fn has_subscription(&self, id: SubscriptionId) -> bool {
        self.subscriber.has_subscription(id)
    }

    pub fn subscriptions(&self) -> Vec<Arc<dyn SubscriptionEntry>> {
        self.subscriber.subscriptions()
    }

    pub fn find_subscriptions_by_notification(&self, notification: &str) -> Vec<Arc<dyn SubscriptionEntry>> {
        self.subscriber.find_subscriptions_by_notification(notification)
    }

    pub fn find_subscription_by_id(&self, id: SubscriptionId) -> Option<Arc<dyn SubscriptionEntry>> {
        self.subscriber.find_subscription_by_id(id)
    }

    pub fn clear_subscription(&self, id: SubscriptionId) -> Result<()> {
        self.subscriber.clear_subscription(id)
    }

    /// Detach everything: subscriptions others hold on this entity and those it
    /// holds on other publishers.
    pub fn destroy(&self) {
        self.publisher.destroy();
        self.subscriber.destroy();
    }
}

impl<P> Identifiable for PublisherSubscriber<P> {
    fn id(&self) -> &str {
        self.publisher.id()
    }
}

impl<P> Clone for PublisherSubscriber<P> {
    fn clone(&self) -> Self {
        Self {
            publisher: self.publisher.clone(),
            subscriber: self.subscriber.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_shared_identity() {
        let node: PublisherSubscriber<u32> = PublisherSubscriber::new("node");
        assert_eq!(node.id(), "node");
        assert!(node.is("node"));
        assert!(node.publisher().is("node"));
        assert!(node.subscriber().is("node"));
    }

    #[test]
    fn test_role_counts_are_independent() {
        let a: PublisherSubscriber<u32> = PublisherSubscriber::new("a");
        let b: PublisherSubscriber<u32> = PublisherSubscriber::new("b");

        a.subscribe(b.publisher(), "ping", |_| Ok(())).unwrap();
        a.subscribe(b.publisher(), "pong", |_| Ok(())).unwrap();
        b.subscribe(a.publisher(), "ping", |_| Ok(())).unwrap();

        assert_eq!(a.nb_subscriptions_as_subscriber(), 2);
        assert_eq!(a.nb_subscriptions_as_publisher(), 1);
        assert_eq!(b.nb_subscriptions_as_subscriber(), 1);
        assert_eq!(b.nb_subscriptions_as_publisher(), 2);

        #[allow(deprecated)]
        let count = a.nb_subscriptions();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_self_subscription() {
        let node: PublisherSubscriber<u32> = PublisherSubscriber::new("node");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let in_handler = seen.clone();

        let sub = node
            .subscribe(node.publisher(), "echo", move |v: &u32| {
                in_handler.lock().push(*v);
                Ok(())
            })
            .unwrap();
        assert_eq!(sub.subscriber_id(), sub.publisher_id());

        node.publish("echo", 3).unwrap();
        assert_eq!(*seen.lock(), vec![3]);

        node.destroy();
        assert_eq!(node.nb_subscriptions_as_publisher(), 0);
        assert_eq!(node.nb_subscriptions_as_subscriber(), 0);
    }

    #[test]
    fn test_destroy_detaches_both_roles() {
        let a: PublisherSubscriber<u32> = PublisherSubscriber::new("a");
        let b: PublisherSubscriber<u32> = PublisherSubscriber::new("b");
        a.subscribe(b.publisher(), "ping", |_| Ok(())).unwrap();
        b.subscribe(a.publisher(), "ping", |_| Ok(())).unwrap();

        a.destroy();

        assert_eq!(a.nb_subscriptions_as_publisher(), 0);
        assert_eq!(a.nb_subscriptions_as_subscriber(), 0);
        assert_eq!(b.nb_subscriptions_as_publisher(), 0);
        assert_eq!(b.nb_subscriptions_as_subscriber(), 0);
    }

    #[test]
    fn test_policy_delegates_to_publisher() {
        let node: PublisherSubscriber<u32> = PublisherSubscriber::new("node");
        node.stop_publication_on_exception();
        assert_eq!(node.publisher().exception_policy(), ExceptionPolicy::Stop);
        node.continue_publication_on_exception();
        assert_eq!(node.exception_policy(), ExceptionPolicy::Continue);
    }
}
