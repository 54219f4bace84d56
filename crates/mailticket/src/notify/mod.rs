//! Confirmation notices to ticket senders.

use async_trait::async_trait;
use thiserror::Error;

use crate::tickets::Ticket;

pub mod smtp;
pub mod template;

pub use smtp::{SmtpConfig, SmtpConfirmationSender};

/// Errors from sending a confirmation.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Sending is not configured.
    #[error("Confirmation delivery is disabled")]
    Disabled,

    /// The sender or recipient address cannot be used.
    #[error("Invalid address: {0}")]
    Address(String),

    /// The message could not be assembled.
    #[error("Failed to build message: {0}")]
    Build(String),

    /// The server failed temporarily; a later attempt may succeed.
    #[error("Transient SMTP error: {0}")]
    Transient(String),

    /// The server refused the message.
    #[error("Permanent SMTP error: {0}")]
    Permanent(String),

    /// Connection or TLS failure.
    #[error("SMTP connection failed: {0}")]
    Connection(String),
}

/// Sends the "ticket received" notice for a new ticket.
#[async_trait]
pub trait ConfirmationSender: Send + Sync {
    async fn send_confirmation(&self, ticket: &Ticket) -> Result<(), DeliveryError>;
}

/// Sender used when no SMTP credentials are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledSender;

#[async_trait]
impl ConfirmationSender for DisabledSender {
    async fn send_confirmation(&self, _ticket: &Ticket) -> Result<(), DeliveryError> {
        Err(DeliveryError::Disabled)
    }
}
