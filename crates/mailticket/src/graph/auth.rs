//! Application access tokens via the OAuth2 client-credentials grant.
//!
//! `CredentialCache` hands out a cached token until it is within the safety
//! margin of its expiry. Refreshes are single-flight: concurrent callers that
//! find the token stale queue on a refresh gate, and the first one through
//! performs the exchange while the others pick up its result.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::error::AuthError;
use crate::sanitize;

/// Scope requesting all application permissions granted to the app.
pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
/// Identity provider base URL.
pub const DEFAULT_LOGIN_BASE_URL: &str = "https://login.microsoftonline.com";
/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;
/// Tokens are not handed out within this window of their expiry.
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(5 * 60);

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the HTTP client shared by the token endpoint and Graph calls.
pub fn create_http_client() -> Result<Client, AuthError> {
    Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .build()
        .map_err(|e| AuthError::Transport(format!("Failed to create HTTP client: {e}")))
}

/// A bearer token with its validity window. Lives only in memory.
#[derive(Clone)]
pub struct AccessToken {
    bearer: Arc<SecretString>,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(bearer: SecretString, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            bearer: Arc::new(bearer),
            issued_at,
            expires_at,
        }
    }

    /// The raw bearer value, for the `Authorization` header only.
    pub fn bearer(&self) -> &str {
        self.bearer.expose_secret()
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the token may still be handed out at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, safety_margin: Duration) -> bool {
        let margin = chrono::Duration::from_std(safety_margin)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        match self.expires_at.checked_sub_signed(margin) {
            Some(deadline) => now < deadline,
            None => false,
        }
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("bearer", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Performs one token exchange against the identity provider.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(&self) -> Result<AccessToken, AuthError>;
}

/// Settings for the client-credentials grant.
pub struct ClientCredentialsConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub login_base_url: String,
}

impl ClientCredentialsConfig {
    /// `{login}/{tenant}/oauth2/v2.0/token`
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.login_base_url.trim_end_matches('/'),
            self.tenant_id
        )
    }
}

/// Response body from the token endpoint.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Error body from the token endpoint.
#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Client-credentials exchange over HTTPS.
pub struct ClientCredentialsExchange {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
}

impl ClientCredentialsExchange {
    pub fn new(client: Client, config: ClientCredentialsConfig) -> Self {
        Self {
            client,
            token_url: config.token_url(),
            client_id: config.client_id,
            client_secret: config.client_secret,
        }
    }
}

#[async_trait]
impl TokenExchange for ClientCredentialsExchange {
    async fn exchange(&self) -> Result<AccessToken, AuthError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("scope", GRAPH_SCOPE),
            ("grant_type", "client_credentials"),
        ];

        let issued_at = Utc::now();
        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(desc) => format!("{}: {}", err.error, sanitize::truncate_error_body(&desc)),
                    None => err.error,
                },
                Err(_) => sanitize::truncate_error_body(&body),
            };
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
        if token.access_token.is_empty() {
            return Err(AuthError::InvalidResponse("empty access_token".to_string()));
        }

        let lifetime = token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        let expires_at = expiry_after(issued_at, lifetime)?;
        Ok(AccessToken::new(
            SecretString::from(token.access_token),
            issued_at,
            expires_at,
        ))
    }
}

fn expiry_after(issued_at: DateTime<Utc>, lifetime_secs: u64) -> Result<DateTime<Utc>, AuthError> {
    i64::try_from(lifetime_secs)
        .ok()
        .and_then(chrono::TimeDelta::try_seconds)
        .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
        .ok_or_else(|| AuthError::InvalidResponse(format!("expires_in out of range: {lifetime_secs}")))
}

/// Retry policy for transient exchange failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each further one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// In-memory token cache with single-flight refresh.
pub struct CredentialCache {
    exchange: Arc<dyn TokenExchange>,
    safety_margin: Duration,
    retry: RetryPolicy,
    current: RwLock<Option<AccessToken>>,
    refresh_gate: Mutex<()>,
    exchanges: AtomicU64,
}

impl CredentialCache {
    pub fn new(exchange: Arc<dyn TokenExchange>) -> Self {
        Self {
            exchange,
            safety_margin: DEFAULT_SAFETY_MARGIN,
            retry: RetryPolicy::default(),
            current: RwLock::new(None),
            refresh_gate: Mutex::new(()),
            exchanges: AtomicU64::new(0),
        }
    }

    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns a token that stays valid for at least the safety margin,
    /// exchanging credentials first if needed.
    pub async fn get_token(&self) -> Result<AccessToken, AuthError> {
        if let Some(token) = self.fresh_cached().await {
            return Ok(token);
        }

        let _gate = self.refresh_gate.lock().await;

        // Another caller may have refreshed while we waited at the gate.
        if let Some(token) = self.fresh_cached().await {
            return Ok(token);
        }

        let token = self.exchange_with_retry().await?;
        *self.current.write().await = Some(token.clone());
        info!(expires_at = %token.expires_at(), "Obtained application access token");
        Ok(token)
    }

    /// Drops the cached token, e.g. after the API answered 401 with it.
    pub async fn invalidate(&self) {
        *self.current.write().await = None;
    }

    /// Number of exchange attempts made so far.
    pub fn exchange_count(&self) -> u64 {
        self.exchanges.load(Ordering::Relaxed)
    }

    async fn fresh_cached(&self) -> Option<AccessToken> {
        let current = self.current.read().await;
        current
            .as_ref()
            .filter(|t| t.is_fresh(Utc::now(), self.safety_margin))
            .cloned()
    }

    async fn exchange_with_retry(&self) -> Result<AccessToken, AuthError> {
        let mut delay = self.retry.base_delay;
        let mut attempt = 1;
        loop {
            self.exchanges.fetch_add(1, Ordering::Relaxed);
            match self.exchange.exchange().await {
                Ok(token) => return Ok(token),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    warn!(attempt, error = %e, "Token exchange failed, retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => {
                    debug!(attempt, "Token exchange gave up");
                    return Err(e);
                }
            }
        }
    }
}
