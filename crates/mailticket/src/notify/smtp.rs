//! SMTP delivery using `lettre`.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use super::template;
use super::{ConfirmationSender, DeliveryError};
use crate::sanitize;
use crate::tickets::Ticket;

pub const DEFAULT_SMTP_HOST: &str = "smtp-mail.outlook.com";
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// SMTP settings. The login address is also the sender address.
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &sanitize::redact_email(&self.username))
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Sends confirmations over STARTTLS-authenticated SMTP.
pub struct SmtpConfirmationSender {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl std::fmt::Debug for SmtpConfirmationSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfirmationSender")
            .field("from", &sanitize::redact_email(&self.from.email.to_string()))
            .field("transport", &"<AsyncSmtpTransport>")
            .finish()
    }
}

impl SmtpConfirmationSender {
    pub fn new(config: SmtpConfig) -> Result<Self, DeliveryError> {
        let from: Mailbox = config
            .username
            .parse()
            .map_err(|e| DeliveryError::Address(format!("invalid sender address: {e}")))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| DeliveryError::Connection(format!("SMTP TLS relay error: {e}")))?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.expose_secret().to_string(),
            ))
            .build();

        Ok(Self { from, transport })
    }
}

/// Builds the confirmation message for a ticket.
fn build_message(from: &Mailbox, ticket: &Ticket) -> Result<Message, DeliveryError> {
    let to: Mailbox = ticket
        .sender_email
        .parse()
        .map_err(|e| DeliveryError::Address(format!("invalid recipient address: {e}")))?;

    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(template::subject(ticket))
        .header(ContentType::TEXT_PLAIN)
        .body(template::plain_text_body(ticket))
        .map_err(|e| DeliveryError::Build(e.to_string()))
}

fn map_smtp_error(error: &lettre::transport::smtp::Error) -> DeliveryError {
    let message = error.to_string();
    if error.is_transient() {
        DeliveryError::Transient(message)
    } else if error.is_permanent() {
        DeliveryError::Permanent(message)
    } else {
        DeliveryError::Connection(message)
    }
}

#[async_trait]
impl ConfirmationSender for SmtpConfirmationSender {
    async fn send_confirmation(&self, ticket: &Ticket) -> Result<(), DeliveryError> {
        let recipient = sanitize::redact_email(&ticket.sender_email);
        debug!(ticket = %ticket.ticket_number, to = %recipient, "Building confirmation");
        let message = build_message(&self.from, ticket)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| map_smtp_error(&e))?;

        info!(ticket = %ticket.ticket_number, to = %recipient, "Confirmation sent");
        Ok(())
    }
}
