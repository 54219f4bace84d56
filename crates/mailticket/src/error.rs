use thiserror::Error;

use crate::db::DatabaseError;
use crate::graph::{AuthError, SubscriptionError};
use crate::notify::DeliveryError;
use crate::secrets::SecretError;
use crate::telemetry::TelemetryError;

#[derive(Error, Debug)]
pub enum MailTicketError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    #[error("Confirmation delivery setup failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Required setting '{name}' is not set")]
    Missing { name: String },

    #[error("Invalid value '{value}' for '{name}': {reason}")]
    Invalid {
        name: String,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Secret(SecretError),
}

impl From<SecretError> for ConfigError {
    fn from(e: SecretError) -> Self {
        match e {
            SecretError::NotSet { name } => ConfigError::Missing { name },
            other => ConfigError::Secret(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, MailTicketError>;
