//! Inbound change notifications: parsing and authentication.

pub mod notification;
pub mod validator;

pub use notification::{parse_batch, Notification, NotificationBatch};
pub use validator::NotificationValidator;

use thiserror::Error;

/// Why a notification (or a whole batch) was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The body is not a `{"value": [...]}` envelope. The only case that
    /// fails the whole request.
    #[error("Malformed notification body: {0}")]
    MalformedBody(String),

    /// One entry of the batch has an unexpected shape.
    #[error("Malformed notification entry: {0}")]
    MalformedEntry(String),

    /// The entry names no message.
    #[error("Notification carries no message id")]
    MissingResourceId,

    /// The entry references a subscription this process does not hold.
    #[error("Notification for unknown subscription '{subscription_id}'")]
    UnknownSubscription { subscription_id: String },

    /// The entry's client state does not match the stored secret.
    #[error("Client state mismatch for subscription '{subscription_id}'")]
    ClientStateMismatch { subscription_id: String },

    /// The subscription store could not be read.
    #[error("Subscription lookup failed: {0}")]
    Lookup(String),
}
