//! Wait for several notifications through one-shot subscriptions.

use crate::error::{PubSubError, Result};
use crate::publisher::Publisher;
use crate::subscriber::Subscriber;
use crate::subscriptions::Subscription;
use crate::types::Identifiable;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::debug;

/// Callback run with the payload when a record fires.
pub type RecordHandler<P> = Box<dyn Fn(&P) + Send + Sync>;

/// One notification to wait for.
pub struct WaitRecord<'a, P> {
    /// Publisher expected to emit the notification.
    pub from: &'a Publisher<P>,
    /// Notification name.
    pub name: String,
    /// Optional callback run with the payload when it fires.
    pub handler: Option<RecordHandler<P>>,
}

impl<'a, P> WaitRecord<'a, P> {
    pub fn new(from: &'a Publisher<P>, name: impl Into<String>) -> Self {
        Self {
            from,
            name: name.into(),
            handler: None,
        }
    }

    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }
}

/// Completion counter shared by every one-shot handler of a wait.
struct WaitState<P> {
    payloads: Vec<Option<P>>,
    /// Registered subscriptions that have not fired yet.
    pending: Vec<Option<Weak<Subscription<P>>>>,
    fired: usize,
    /// Taken on completion or cancellation.
    sender: Option<Sender<Vec<P>>>,
}

impl<P> WaitState<P> {
    fn total(&self) -> usize {
        self.payloads.len()
    }

    fn is_complete(&self) -> bool {
        self.fired == self.total()
    }

    /// Payloads in record order, once all have fired.
    fn results(&self) -> Option<Vec<P>>
    where
        P: Clone,
    {
        if !self.is_complete() {
            return None;
        }
        self.payloads.iter().cloned().collect()
    }

    /// Sender and results, the first time the wait is found complete.
    fn take_completion(&mut self) -> Option<(Sender<Vec<P>>, Vec<P>)>
    where
        P: Clone,
    {
        let results = self.results()?;
        self.sender.take().map(|sender| (sender, results))
    }
}

/// Owned by the one-shot handler of record `index`. Dropped before the record
/// fired, the wait can no longer complete and is cancelled.
struct RecordGuard<P> {
    state: Arc<Mutex<WaitState<P>>>,
    index: usize,
}

impl<P> Drop for RecordGuard<P> {
    fn drop(&mut self) {
        let sender = {
            let mut state = self.state.lock();
            if state.payloads[self.index].is_some() {
                return;
            }
            state.sender.take()
        };
        if sender.is_some() {
            debug!(index = self.index, "Wait record released before firing");
        }
    }
}

/// Removes a fired record's subscription and completes the wait on drop, so
/// both happen even when the record callback panics.
struct Fired<'a, P: Clone> {
    state: &'a Mutex<WaitState<P>>,
    subscription: Option<Arc<Subscription<P>>>,
}

impl<P: Clone> Drop for Fired<'_, P> {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        let completion = self.state.lock().take_completion();
        if let Some((sender, results)) = completion {
            let _ = sender.send(results);
        }
    }
}

/// Handle to a pending [`Subscriber::wait_until`].
///
/// Dropping the handle does not cancel the wait: record handlers still run and
/// each subscription still removes itself when it fires. Call
/// [`cancel`](Self::cancel) to release subscriptions that have not fired.
///
/// A record whose subscription is removed before it fires, through
/// [`Subscriber::destroy`] or any other unsubscribe, cancels the wait.
pub struct WaitHandle<P> {
    state: Arc<Mutex<WaitState<P>>>,
    receiver: Receiver<Vec<P>>,
}

impl<P: Clone + Send + 'static> WaitHandle<P> {
    pub(crate) fn register(subscriber: &Subscriber, records: Vec<WaitRecord<'_, P>>) -> Result<Self> {
        let total = records.len();
        let (sender, receiver) = bounded(1);
        let state = Arc::new(Mutex::new(WaitState {
            payloads: (0..total).map(|_| None).collect(),
            pending: (0..total).map(|_| None).collect(),
            fired: 0,
            sender: Some(sender),
        }));
        let handle = WaitHandle { state, receiver };

        if total == 0 {
            handle.complete_if_done();
            return Ok(handle);
        }

        for (index, record) in records.into_iter().enumerate() {
            let WaitRecord { from, name, handler } = record;
            let on_fire = Self::one_shot(Arc::clone(&handle.state), index, handler);

            let subscription = match subscriber.subscribe(from, &name, on_fire) {
                Ok(subscription) => subscription,
                Err(e) => {
                    handle.cancel();
                    return Err(e);
                }
            };

            let already_fired = {
                let mut state = handle.state.lock();
                let fired = state.payloads[index].is_some();
                if !fired {
                    state.pending[index] = Some(Arc::downgrade(&subscription));
                }
                fired
            };
            // Fired from another thread before it could be tracked.
            if already_fired {
                subscription.unsubscribe();
            }

            debug!(
                subscriber = %subscriber.id(),
                publisher = %from.id(),
                notification = %name,
                index,
                "Waiting for notification"
            );
        }

        Ok(handle)
    }

    /// Handler for record `index`: capture the payload, run the record callback,
    /// drop the subscription, complete the wait when it was the last one.
    fn one_shot(
        state: Arc<Mutex<WaitState<P>>>,
        index: usize,
        handler: Option<RecordHandler<P>>,
    ) -> impl Fn(&P) -> crate::HandlerResult + Send + Sync + 'static {
        let guard = RecordGuard { state, index };
        move |payload: &P| {
            let guard = &guard;
            let state = &*guard.state;
            let subscription = {
                let mut state = state.lock();
                if state.payloads[index].is_some() {
                    return Ok(());
                }
                state.payloads[index] = Some(payload.clone());
                state.fired += 1;
                state.pending[index].take().and_then(|weak| weak.upgrade())
            };

            let _fired = Fired { state, subscription };
            if let Some(handler) = &handler {
                handler(payload);
            }
            Ok(())
        }
    }

    fn complete_if_done(&self) {
        let completion = self.state.lock().take_completion();
        if let Some((sender, results)) = completion {
            let _ = sender.send(results);
        }
    }

    /// Block until every record has fired.
    ///
    /// Must not be called from the thread that is expected to publish.
    pub fn wait(self) -> Result<Vec<P>> {
        self.receiver.recv().map_err(|_| PubSubError::WaitCancelled)
    }

    /// Block for at most `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Vec<P>> {
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => PubSubError::WaitTimeout,
            RecvTimeoutError::Disconnected => PubSubError::WaitCancelled,
        })
    }

    /// Take the payloads if every record has fired. The result is delivered once.
    pub fn try_wait(&self) -> Result<Option<Vec<P>>> {
        match self.receiver.try_recv() {
            Ok(results) => Ok(Some(results)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(PubSubError::WaitCancelled),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state.lock().is_complete()
    }

    /// Number of records still waiting to fire.
    pub fn remaining(&self) -> usize {
        let state = self.state.lock();
        state.total() - state.fired
    }

    /// Unsubscribe every record that has not fired. A completed wait keeps its result.
    pub fn cancel(&self) {
        let pending: Vec<_> = {
            let mut state = self.state.lock();
            if !state.is_complete() {
                state.sender.take();
            }
            state
                .pending
                .iter_mut()
                .filter_map(|slot| slot.take().and_then(|weak| weak.upgrade()))
                .collect()
        };

        debug!(released = pending.len(), "Wait cancelled");
        for subscription in pending {
            subscription.unsubscribe();
        }
    }
}
