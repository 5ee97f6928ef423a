//! # Notifier
//!
//! In-process publish/subscribe with priority-ordered, synchronous dispatch.
//!
//! ## Core Concepts
//!
//! - **Publishers**: emit named notifications carrying a payload of type `P`
//! - **Subscribers**: bind handlers to a (publisher, notification) pair and keep
//!   their own index for bulk unsubscription
//! - **Subscriptions**: one record indexed by both sides; `unsubscribe` removes
//!   it from both and releases the handler
//! - **Waits**: one-shot subscriptions resolving once several notifications fired
//!
//! ## Example
//!
//! ```ignore
//! use notifier::{Publisher, Subscriber, WaitRecord};
//!
//! let door: Publisher<String> = Publisher::new("door");
//! let alarm = Subscriber::new("alarm");
//!
//! // Higher priority runs first
//! alarm.subscribe_with_priority(&door, "opened", |who: &String| {
//!     println!("{who} opened the door");
//!     Ok(())
//! }, 10.0)?;
//!
//! door.publish("opened", "bob".to_string())?;
//!
//! // Wait for the door to close
//! let closed = alarm.wait_until(vec![WaitRecord::new(&door, "closed")])?;
//! door.publish("closed", "bob".to_string())?;
//! assert_eq!(closed.wait()?, vec!["bob".to_string()]);
//!
//! alarm.destroy();
//! ```

pub mod error;
pub mod proxy;
pub mod publisher;
pub mod publisher_subscriber;
pub mod subscriber;
pub mod subscriptions;
pub mod types;
pub mod wait;

// Re-exports
pub use error::{PubSubError, Result};
pub use proxy::PublisherProxy;
pub use publisher::Publisher;
pub use publisher_subscriber::PublisherSubscriber;
pub use subscriber::Subscriber;
pub use subscriptions::{Subscription, SubscriptionEntry, SubscriptionManager};
pub use types::*;
pub use wait::{RecordHandler, WaitHandle, WaitRecord};
