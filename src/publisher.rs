//! Publisher: synchronous, priority-ordered fan-out of notifications.

use crate::error::{PubSubError, Result};
use crate::subscriptions::{Subscription, SubscriptionManager};
use crate::types::{ExceptionPolicy, Handler, HandlerError, Identifiable, PublisherConfig, SubscriptionId};
use parking_lot::RwLock;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{trace, warn};

/// Why a single handler invocation failed.
enum Failure {
    Returned(HandlerError),
    Panicked(String),
}

impl Failure {
    fn into_error(self, subscription: SubscriptionId, notification: &str) -> PubSubError {
        match self {
            Failure::Returned(source) => PubSubError::Handler {
                subscription,
                notification: notification.to_string(),
                source,
            },
            Failure::Panicked(message) => PubSubError::HandlerPanicked {
                subscription,
                notification: notification.to_string(),
                message,
            },
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Emits notifications carrying payloads of type `P` to its subscribers.
///
/// Cloning yields another handle to the same publisher.
pub struct Publisher<P> {
    manager: SubscriptionManager<Subscription<P>>,
    policy: Arc<RwLock<ExceptionPolicy>>,
    catch_panics: bool,
}

impl<P: 'static> Publisher<P> {
    /// Create a publisher with the default configuration.
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_config(id, PublisherConfig::default())
    }

    pub fn with_config(id: impl Into<String>, config: PublisherConfig) -> Self {
        Self {
            manager: SubscriptionManager::new(id),
            policy: Arc::new(RwLock::new(config.exception_policy)),
            catch_panics: config.catch_panics,
        }
    }

    /// Deliver `payload` to every subscription of `notification`.
    ///
    /// Handlers run in priority order against a snapshot of the bucket taken
    /// before the first one runs, so subscriptions added or removed by a handler
    /// only affect later publications. A notification nobody listens to is a
    /// no-op. Under [`ExceptionPolicy::Stop`] the first handler failure aborts
    /// the dispatch and is returned; under [`ExceptionPolicy::Continue`] it is
    /// logged and skipped.
    pub fn publish(&self, notification: &str, payload: P) -> Result<()> {
        let snapshot: Vec<(SubscriptionId, Handler<P>)> = match self.manager.with_bucket(
            notification,
            |bucket| {
                bucket
                    .iter()
                    .filter_map(|sub| sub.handler().map(|handler| (sub.id(), handler)))
                    .collect::<Vec<_>>()
            },
        ) {
            Some(snapshot) => snapshot,
            None => {
                trace!(publisher = %self.id(), notification, "No subscribers");
                return Ok(());
            }
        };

        trace!(
            publisher = %self.id(),
            notification,
            handlers = snapshot.len(),
            "Publishing"
        );

        for (subscription, handler) in snapshot {
            let Err(failure) = self.invoke(&handler, &payload) else {
                continue;
            };

            let error = failure.into_error(subscription, notification);
            if self.exception_policy() == ExceptionPolicy::Stop {
                return Err(error);
            }
            warn!(
                publisher = %self.id(),
                %subscription,
                notification,
                %error,
                "Handler failed, continuing publication"
            );
        }

        Ok(())
    }

    fn invoke(&self, handler: &Handler<P>, payload: &P) -> std::result::Result<(), Failure> {
        if !self.catch_panics {
            return handler(payload).map_err(Failure::Returned);
        }

        match catch_unwind(AssertUnwindSafe(|| handler(payload))) {
            Ok(result) => result.map_err(Failure::Returned),
            Err(panic) => Err(Failure::Panicked(panic_message(panic))),
        }
    }

    /// Register a subscription under `notification`.
    ///
    /// The subscription is bound to this publisher, so its
    /// [`unsubscribe`](Subscription::unsubscribe) removes it from here.
    pub fn add_subscriber(&self, notification: &str, subscription: Arc<Subscription<P>>) -> Result<()> {
        self.manager.add_subscription(notification, Arc::clone(&subscription))?;
        subscription.bind_publisher(self.manager.downgrade());
        Ok(())
    }

    /// Unsubscribe every subscription created by `subscriber_id`.
    pub fn remove_subscriber(&self, subscriber_id: &str) {
        for subscription in self.find_subscription_by_subscriber_id(subscriber_id) {
            subscription.unsubscribe();
        }
    }

    pub fn find_subscription_by_subscriber_id(&self, subscriber_id: &str) -> Vec<Arc<Subscription<P>>> {
        self.manager.filter(|sub| sub.subscriber_id() == subscriber_id)
    }

    pub fn find_subscriptions_by_notification_and_subscriber_id(
        &self,
        notification: &str,
        subscriber_id: &str,
    ) -> Vec<Arc<Subscription<P>>> {
        self.manager
            .find_subscriptions_by_notification(notification)
            .into_iter()
            .filter(|sub| sub.subscriber_id() == subscriber_id)
            .collect()
    }

    pub fn stop_publication_on_exception(&self) {
        *self.policy.write() = ExceptionPolicy::Stop;
    }

    /// Restore the default policy.
    pub fn continue_publication_on_exception(&self) {
        *self.policy.write() = ExceptionPolicy::Continue;
    }

    pub fn exception_policy(&self) -> ExceptionPolicy {
        *self.policy.read()
    }

    pub fn has_subscription(&self, id: SubscriptionId) -> bool {
        self.manager.has_subscription(id)
    }

    pub fn subscriptions(&self) -> Vec<Arc<Subscription<P>>> {
        self.manager.subscriptions()
    }

    pub fn nb_subscriptions(&self) -> usize {
        self.manager.nb_subscriptions()
    }

    pub fn find_subscriptions_by_notification(&self, notification: &str) -> Vec<Arc<Subscription<P>>> {
        self.manager.find_subscriptions_by_notification(notification)
    }

    pub fn find_subscription_by_id(&self, id: SubscriptionId) -> Option<Arc<Subscription<P>>> {
        self.manager.find_subscription_by_id(id)
    }

    /// Low-level removal from this publisher only; the subscriber keeps its
    /// record. Prefer [`Subscription::unsubscribe`].
    pub fn clear_subscription(&self, id: SubscriptionId) -> Result<()> {
        self.manager.clear_subscription(id)
    }

    /// Detach every subscription, publisher and subscriber side alike.
    pub fn destroy(&self) {
        self.manager.destroy();
    }
}

impl<P> Identifiable for Publisher<P> {
    fn id(&self) -> &str {
        self.manager.id()
    }
}

impl<P> Clone for Publisher<P> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            policy: Arc::clone(&self.policy),
            catch_panics: self.catch_panics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recording(
        publisher: &Publisher<u32>,
        log: &Arc<Mutex<Vec<String>>>,
        id: u64,
        notification: &str,
        priority: f64,
    ) -> Arc<Subscription<u32>> {
        let log = log.clone();
        let label = format!("s{}", id);
        let sub = Arc::new(
            Subscription::new(SubscriptionId(id), "tester", publisher.id(), notification, move |v: &u32| {
                log.lock().push(format!("{}:{}", label, v));
                Ok(())
            })
            .with_priority(priority),
        );
        publisher.add_subscriber(notification, sub.clone()).unwrap();
        sub
    }

    fn failing(publisher: &Publisher<u32>, id: u64, notification: &str, priority: f64) {
        let sub = Arc::new(
            Subscription::new(SubscriptionId(id), "tester", publisher.id(), notification, |_: &u32| {
                Err("boom".into())
            })
            .with_priority(priority),
        );
        publisher.add_subscriber(notification, sub).unwrap();
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let publisher: Publisher<u32> = Publisher::new("p");
        publisher.stop_publication_on_exception();
        publisher.publish("nothing", 1).unwrap();
    }

    #[test]
    fn test_publish_in_priority_order() {
        let publisher = Publisher::new("p");
        let log = Arc::new(Mutex::new(Vec::new()));
        recording(&publisher, &log, 1, "n", 1.0);
        recording(&publisher, &log, 2, "n", 3.0);
        recording(&publisher, &log, 3, "n", 1.0);
        recording(&publisher, &log, 4, "other", 9.0);

        publisher.publish("n", 7).unwrap();

        assert_eq!(*log.lock(), vec!["s2:7", "s1:7", "s3:7"]);
    }

    #[test]
    fn test_continue_policy_swallows_failures() {
        let publisher = Publisher::new("p");
        let log = Arc::new(Mutex::new(Vec::new()));
        recording(&publisher, &log, 1, "n", 3.0);
        failing(&publisher, 2, "n", 2.0);
        recording(&publisher, &log, 3, "n", 1.0);

        assert_eq!(publisher.exception_policy(), ExceptionPolicy::Continue);
        publisher.publish("n", 1).unwrap();

        assert_eq!(*log.lock(), vec!["s1:1", "s3:1"]);
    }

    #[test]
    fn test_stop_policy_aborts_dispatch() {
        let publisher = Publisher::new("p");
        let log = Arc::new(Mutex::new(Vec::new()));
        recording(&publisher, &log, 1, "n", 3.0);
        failing(&publisher, 2, "n", 2.0);
        recording(&publisher, &log, 3, "n", 1.0);

        publisher.stop_publication_on_exception();
        let result = publisher.publish("n", 1);

        assert!(matches!(
            result,
            Err(PubSubError::Handler { subscription, .. }) if subscription == SubscriptionId(2)
        ));
        assert_eq!(*log.lock(), vec!["s1:1"]);

        publisher.continue_publication_on_exception();
        log.lock().clear();
        publisher.publish("n", 2).unwrap();
        assert_eq!(*log.lock(), vec!["s1:2", "s3:2"]);
    }

    #[test]
    fn test_panicking_handler_is_a_failure() {
        let publisher = Publisher::new("p");
        let log = Arc::new(Mutex::new(Vec::new()));
        let sub = Arc::new(Subscription::new(SubscriptionId(1), "t", "p", "n", |_: &u32| -> crate::HandlerResult {
            panic!("handler exploded")
        }).with_priority(1.0));
        publisher.add_subscriber("n", sub).unwrap();
        recording(&publisher, &log, 2, "n", 0.0);

        publisher.publish("n", 5).unwrap();
        assert_eq!(*log.lock(), vec!["s2:5"]);

        publisher.stop_publication_on_exception();
        let result = publisher.publish("n", 6);
        assert!(matches!(
            result,
            Err(PubSubError::HandlerPanicked { ref message, .. }) if message == "handler exploded"
        ));
    }

    #[test]
    fn test_config_sets_initial_policy() {
        let publisher: Publisher<u32> = Publisher::with_config(
            "p",
            PublisherConfig {
                exception_policy: ExceptionPolicy::Stop,
                ..Default::default()
            },
        );
        assert_eq!(publisher.exception_policy(), ExceptionPolicy::Stop);
        assert_eq!(publisher.clone().exception_policy(), ExceptionPolicy::Stop);
    }

    #[test]
    fn test_remove_subscriber_and_filters() {
        let publisher = Publisher::new("p");
        let log = Arc::new(Mutex::new(Vec::new()));
        recording(&publisher, &log, 1, "a", 0.0);
        recording(&publisher, &log, 2, "b", 0.0);
        let foreign = Arc::new(Subscription::new(SubscriptionId(3), "other", "p", "a", |_: &u32| Ok(())));
        publisher.add_subscriber("a", foreign).unwrap();

        assert_eq!(publisher.find_subscription_by_subscriber_id("tester").len(), 2);
        assert_eq!(
            publisher
                .find_subscriptions_by_notification_and_subscriber_id("a", "other")
                .len(),
            1
        );

        publisher.remove_subscriber("tester");

        assert_eq!(publisher.nb_subscriptions(), 1);
        assert!(publisher.has_subscription(SubscriptionId(3)));
        assert!(publisher.find_subscriptions_by_notification("b").is_empty());
    }

    #[test]
    fn test_unsubscribe_during_dispatch_uses_snapshot() {
        let publisher: Publisher<u32> = Publisher::new("p");
        let log = Arc::new(Mutex::new(Vec::new()));
        let victim = recording(&publisher, &log, 2, "n", 1.0);

        let killer_log = log.clone();
        let killer = Arc::new(
            Subscription::new(SubscriptionId(1), "tester", "p", "n", move |_: &u32| {
                killer_log.lock().push("killer".to_string());
                victim.unsubscribe();
                Ok(())
            })
            .with_priority(5.0),
        );
        publisher.add_subscriber("n", killer).unwrap();

        publisher.publish("n", 1).unwrap();
        assert_eq!(*log.lock(), vec!["killer", "s2:1"]);

        log.lock().clear();
        publisher.publish("n", 2).unwrap();
        assert_eq!(*log.lock(), vec!["killer"]);
        assert_eq!(publisher.nb_subscriptions(), 1);
    }

    #[test]
    fn test_destroy_detaches_everything() {
        let publisher = Publisher::new("p");
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recording(&publisher, &log, 1, "a", 0.0);
        recording(&publisher, &log, 2, "b", 0.0);

        publisher.destroy();

        assert_eq!(publisher.nb_subscriptions(), 0);
        assert!(!a.is_active());
        publisher.publish("a", 1).unwrap();
        assert!(log.lock().is_empty());
    }
}
