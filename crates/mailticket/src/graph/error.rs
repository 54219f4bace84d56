//! Errors from the identity provider and the Graph API.

use thiserror::Error;

use crate::db::DatabaseError;
use crate::secrets::SecretError;

/// Errors from the client-credentials token exchange.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The identity provider rejected the request (bad client id/secret,
    /// unknown tenant, missing consent).
    #[error("Identity provider rejected the token request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The token endpoint could not be reached or timed out.
    #[error("Token endpoint unreachable: {0}")]
    Transport(String),

    /// The token endpoint answered with something that is not a token.
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),
}

impl AuthError {
    /// Transport failures and server-side errors are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AuthError::Transport(_) => true,
            AuthError::Rejected { status, .. } => *status >= 500 || *status == 429,
            AuthError::InvalidResponse(_) => false,
        }
    }
}

/// Errors from the subscription management API and the local registry.
#[derive(Error, Debug)]
pub enum SubscriptionError {
    /// The provider no longer knows the subscription (expired or deleted).
    #[error("Subscription '{id}' not found")]
    NotFound { id: String },

    /// The application lacks the permissions to subscribe to the resource.
    #[error("Insufficient permissions ({status}): {message}")]
    Forbidden { status: u16, message: String },

    /// The provider rejected the request, commonly because the validation
    /// handshake against the notification URL failed.
    #[error("Provider rejected subscription request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// A token could not be obtained.
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// The provider could not be reached.
    #[error("Subscription API unreachable: {0}")]
    Transport(String),

    /// The provider answered with an unexpected body.
    #[error("Invalid subscription response: {0}")]
    InvalidResponse(String),

    /// Local record store failure.
    #[error("Subscription store error: {0}")]
    Storage(#[from] DatabaseError),

    /// The client state secret could not be generated.
    #[error("Failed to generate client state: {0}")]
    ClientState(#[from] SecretError),
}

impl SubscriptionError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SubscriptionError::NotFound { .. })
    }
}

/// Errors from reading a message.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The message was deleted or moved before it could be read.
    #[error("Message '{message_id}' no longer exists")]
    Gone { message_id: String },

    /// A token could not be obtained.
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// The provider refused the read.
    #[error("Message read rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The provider could not be reached.
    #[error("Message API unreachable: {0}")]
    Transport(String),

    /// The provider answered with an unexpected body.
    #[error("Invalid message response: {0}")]
    InvalidResponse(String),
}

impl FetchError {
    /// A gone message is a terminal outcome, not a failure to retry.
    pub fn is_gone(&self) -> bool {
        matches!(self, FetchError::Gone { .. })
    }
}
