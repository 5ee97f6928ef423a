//! Core types shared by publishers and subscribers.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Priority given to subscriptions created without an explicit one.
pub const DEFAULT_PRIORITY: f64 = 0.0;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a subscription.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    /// Allocate a fresh, process-unique id.
    pub fn next() -> Self {
        SubscriptionId(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Anything addressable by a stable string id.
pub trait Identifiable {
    fn id(&self) -> &str;

    fn is(&self, id: &str) -> bool {
        self.id() == id
    }
}

/// Error a handler may return to signal a failed delivery.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of one handler invocation.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Shared handler closure invoked with the published payload.
pub type Handler<P> = Arc<dyn Fn(&P) -> HandlerResult + Send + Sync>;

/// What a publisher does when a handler fails during dispatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionPolicy {
    /// Swallow the failure and keep delivering to the remaining handlers.
    #[default]
    Continue,
    /// Abort the dispatch and return the failure to the publishing caller.
    Stop,
}

/// Configuration for a publisher.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Initial exception policy.
    /// Default: Continue
    pub exception_policy: ExceptionPolicy,

    /// Treat a panicking handler as a failed delivery instead of unwinding
    /// through `publish`.
    /// Default: true
    pub catch_panics: bool,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            exception_policy: ExceptionPolicy::Continue,
            catch_panics: true,
        }
    }
}

impl PublisherConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
