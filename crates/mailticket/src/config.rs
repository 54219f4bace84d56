//! Runtime settings from the environment.
//!
//! An optional `.env` file is loaded first. Secrets may be given directly or
//! through a `<NAME>_FILE` reference.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;
use secrecy::SecretString;

use crate::analysis::gemini::DEFAULT_GEMINI_MODEL;
use crate::db::default_database_path;
use crate::error::ConfigError;
use crate::notify::smtp::{DEFAULT_SMTP_HOST, DEFAULT_SMTP_PORT};
use crate::notify::SmtpConfig;
use crate::secrets::{resolve_secret, resolve_secret_optional};
use crate::subscription::registry::DEFAULT_SUBSCRIPTION_LIFETIME_MINUTES;
use crate::subscription::SubscriptionTarget;

const DEFAULT_BIND: &str = "0.0.0.0:8000";
const DEFAULT_WORKERS: usize = 4;
const DEFAULT_QUEUE_CAPACITY: usize = 64;
const DEFAULT_PIPELINE_TIMEOUT_SECS: u64 = 45;
const DEFAULT_RENEWAL_INTERVAL_SECS: u64 = 12 * 60 * 60;
const DEFAULT_RENEWAL_THRESHOLD_SECS: i64 = 24 * 60 * 60;
const DATABASE_FILE: &str = "mailticket.db";

/// Everything the service needs to run.
#[derive(Debug)]
pub struct Settings {
    pub client_id: String,
    pub client_secret: SecretString,
    pub tenant_id: String,
    /// Public base URL the provider reaches this service at.
    pub webhook_url: String,
    pub mailbox: String,
    pub gemini_api_key: SecretString,
    pub gemini_model: String,
    /// `None` disables confirmations.
    pub smtp: Option<SmtpConfig>,
    pub database_path: PathBuf,
    pub bind: SocketAddr,
    pub workers: usize,
    pub queue_capacity: usize,
    pub pipeline_timeout: Duration,
    pub renewal_interval: Duration,
    pub renewal_threshold: chrono::Duration,
    pub subscription_lifetime: chrono::Duration,
    pub auto_subscribe: bool,
}

impl Settings {
    /// Loads `.env` (if any) and reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            log::info!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads settings through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let client_id = required(&lookup, "CLIENT_ID")?;
        let client_secret = resolve_secret(&lookup, "CLIENT_SECRET")?;
        let tenant_id = required(&lookup, "TENANT_ID")?;
        let webhook_url = required(&lookup, "WEBHOOK_URL")?;
        Url::parse(&webhook_url).map_err(|e| ConfigError::Invalid {
            name: "WEBHOOK_URL".into(),
            value: webhook_url.clone(),
            reason: e.to_string(),
        })?;
        let mailbox = required(&lookup, "MAILBOX_ADDRESS")?;
        let gemini_api_key = resolve_secret(&lookup, "GEMINI_API_KEY")?;

        let smtp = match (
            optional(&lookup, "SMTP_EMAIL"),
            resolve_secret_optional(&lookup, "SMTP_PASSWORD")?,
        ) {
            (Some(username), Some(password)) => Some(SmtpConfig {
                host: optional(&lookup, "SMTP_HOST").unwrap_or_else(|| DEFAULT_SMTP_HOST.into()),
                port: parsed(&lookup, "SMTP_PORT", DEFAULT_SMTP_PORT)?,
                username,
                password,
            }),
            _ => None,
        };

        let database_path = match optional(&lookup, "MAILTICKET_DATABASE") {
            Some(path) => PathBuf::from(path),
            None => default_database_path().unwrap_or_else(|| PathBuf::from(DATABASE_FILE)),
        };

        Ok(Self {
            client_id,
            client_secret,
            tenant_id,
            webhook_url,
            mailbox,
            gemini_api_key,
            gemini_model: optional(&lookup, "GEMINI_MODEL")
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.into()),
            smtp,
            database_path,
            bind: parsed(&lookup, "MAILTICKET_BIND", parse_default(DEFAULT_BIND)?)?,
            workers: positive(&lookup, "MAILTICKET_WORKERS", DEFAULT_WORKERS)?,
            queue_capacity: positive(&lookup, "MAILTICKET_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?,
            pipeline_timeout: Duration::from_secs(positive(
                &lookup,
                "MAILTICKET_PIPELINE_TIMEOUT_SECS",
                DEFAULT_PIPELINE_TIMEOUT_SECS,
            )?),
            renewal_interval: Duration::from_secs(positive(
                &lookup,
                "MAILTICKET_RENEWAL_INTERVAL_SECS",
                DEFAULT_RENEWAL_INTERVAL_SECS,
            )?),
            renewal_threshold: chrono::Duration::seconds(positive(
                &lookup,
                "MAILTICKET_RENEWAL_THRESHOLD_SECS",
                DEFAULT_RENEWAL_THRESHOLD_SECS,
            )?),
            subscription_lifetime: chrono::Duration::minutes(positive(
                &lookup,
                "MAILTICKET_SUBSCRIPTION_LIFETIME_MINUTES",
                DEFAULT_SUBSCRIPTION_LIFETIME_MINUTES,
            )?),
            auto_subscribe: parse_bool(&lookup, "MAILTICKET_AUTO_SUBSCRIBE", true)?,
        })
    }

    /// The mailbox inbox and this service's notification URL.
    pub fn target(&self) -> SubscriptionTarget {
        SubscriptionTarget::inbox(&self.mailbox, &self.webhook_url)
    }
}

fn optional<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<F>(lookup: &F, name: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, name).ok_or_else(|| ConfigError::Missing { name: name.into() })
}

fn parse_default<T>(value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        name: "default".into(),
        value: value.into(),
        reason: e.to_string(),
    })
}

fn parsed<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(lookup, name) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name: name.into(),
            reason: e.to_string(),
            value,
        }),
    }
}

fn positive<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialOrd + Default + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    let value = parsed(lookup, name, default)?;
    if value <= T::default() {
        return Err(ConfigError::Invalid {
            name: name.into(),
            value: value.to_string(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(value)
}

fn parse_bool<F>(lookup: &F, name: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match optional(lookup, name) {
        None => Ok(default),
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                name: name.into(),
                value,
                reason: "expected true or false".into(),
            }),
        },
    }
}
