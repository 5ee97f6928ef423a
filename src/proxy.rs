//! Publisher proxy: republishes notifications received from other publishers.

use crate::error::{PubSubError, Result};
use crate::publisher::Publisher;
use crate::publisher_subscriber::PublisherSubscriber;
use crate::subscriptions::SubscriptionEntry;
use crate::types::{HandlerError, Identifiable, PublisherConfig};
use std::ops::Deref;
use tracing::debug;

/// A [`PublisherSubscriber`] that relays notifications from other publishers to
/// its own subscribers, under the same notification name.
pub struct PublisherProxy<P> {
    inner: PublisherSubscriber<P>,
}

impl<P: 'static> PublisherProxy<P> {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_config(id, PublisherConfig::default())
    }

    pub fn with_config(id: impl Into<String>, config: PublisherConfig) -> Self {
        Self {
            inner: PublisherSubscriber::with_config(id, config),
        }
    }

    /// Relay `notification` from `publisher`, converting each payload with `hook`.
    ///
    /// A failure while republishing is reported to `publisher` as a handler failure.
    pub fn add_proxy<Q, F>(&self, publisher: &Publisher<Q>, notification: &str, hook: F) -> Result<&Self>
    where
        Q: 'static,
        F: Fn(&Q) -> P + Send + Sync + 'static,
    {
        let relay = self.inner.publisher().clone();
        let name = notification.to_string();
        self.inner.subscribe(publisher, notification, move |payload: &Q| {
            relay
                .publish(&name, hook(payload))
                .map_err(|e: PubSubError| -> HandlerError { Box::new(e) })
        })?;

        debug!(proxy = %self.id(), publisher = %publisher.id(), notification, "Proxy added");
        Ok(self)
    }

    /// Stop relaying `notification` from the publisher with `publisher_id`.
    pub fn remove_proxy(&self, publisher_id: &str, notification: &str) -> &Self {
        for subscription in self
            .inner
            .find_subscriptions_by_notification_and_publisher_id(notification, publisher_id)
        {
            subscription.unsubscribe();
        }
        self
    }
}

impl<P> Deref for PublisherProxy<P> {
    type Target = PublisherSubscriber<P>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<P> Identifiable for PublisherProxy<P> {
    fn id(&self) -> &str {
        self.inner.id()
    }
}
