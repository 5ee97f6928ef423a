//! Error types for publish/subscribe operations.

use crate::types::{HandlerError, SubscriptionId};
use thiserror::Error;

/// Main error type for publisher and subscriber operations.
#[derive(Debug, Error)]
pub enum PubSubError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Subscription {subscription} already exists in manager '{manager}'")]
    SubscriptionAlreadyExists {
        subscription: SubscriptionId,
        manager: String,
    },

    #[error("Subscription {subscription} not found in manager '{manager}'")]
    SubscriptionNotFound {
        subscription: SubscriptionId,
        manager: String,
    },

    #[error("Handler of subscription {subscription} failed on '{notification}': {source}")]
    Handler {
        subscription: SubscriptionId,
        notification: String,
        #[source]
        source: HandlerError,
    },

    #[error("Handler of subscription {subscription} panicked on '{notification}': {message}")]
    HandlerPanicked {
        subscription: SubscriptionId,
        notification: String,
        message: String,
    },

    #[error("Wait cancelled before every notification fired")]
    WaitCancelled,

    #[error("Timed out waiting for notifications")]
    WaitTimeout,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for PubSubError {
    fn from(e: serde_json::Error) -> Self {
        PubSubError::Config(e.to_string())
    }
}

/// Result type for publish/subscribe operations.
pub type Result<T> = std::result::Result<T, PubSubError>;
