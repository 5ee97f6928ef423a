//! Subscription bookkeeping shared by publishers and subscribers.
//!
//! A [`Subscription`] is indexed twice:
//! - by the publisher's [`SubscriptionManager`], bucketed per notification and
//!   ordered for dispatch
//! - by the subscriber's manager, so it can be removed in bulk by publisher id
//!   or notification name
//!
//! Buckets are ordered by descending priority; equal priorities keep insertion
//! order. Removing the last subscription of a notification drops its bucket.
//!
//! # Example
//!
//! ```ignore
//! let clock: Publisher<u64> = Publisher::new("clock");
//! let sub = Arc::new(Subscription::new(SubscriptionId::next(), "alice", "clock", "tick", |n: &u64| {
//!     println!("tick {n}");
//!     Ok(())
//! }));
//! clock.add_subscriber("tick", sub.clone())?;
//! assert!(clock.has_subscription(sub.id()));
//!
//! sub.unsubscribe();
//! assert_eq!(clock.nb_subscriptions(), 0);
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{Subscription, SubscriptionEntry};
