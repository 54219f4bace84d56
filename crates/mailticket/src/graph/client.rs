//! Graph REST client.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use tracing::{debug, instrument, warn};

use super::auth::CredentialCache;
use super::error::{AuthError, FetchError, SubscriptionError};
use super::types::{
    format_expiration, CreateSubscriptionBody, GraphMessage, RemoteSubscription,
    RenewSubscriptionBody, SubscriptionList, SubscriptionRequest,
};
use super::{MessageSource, SubscriptionApi};
use crate::sanitize;
use crate::tickets::InboundEmail;

/// Graph v1.0 endpoint.
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
/// Message fields read for ticket creation.
const MESSAGE_SELECT: &str = "subject,from,body,receivedDateTime";
/// Asks Graph to convert HTML bodies to plain text.
const PREFER_TEXT_BODY: &str = "outlook.body-content-type=\"text\"";

/// Where the client talks to and which mailbox it reads.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub base_url: String,
    pub mailbox: String,
}

/// Why a Graph call failed, before it is mapped to the caller's error type.
#[derive(Debug)]
enum Failure {
    Auth(AuthError),
    Transport(String),
    Status { status: StatusCode, message: String },
}

impl From<Failure> for SubscriptionError {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Auth(e) => SubscriptionError::Auth(e),
            Failure::Transport(e) => SubscriptionError::Transport(e),
            Failure::Status { status, message }
                if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN =>
            {
                SubscriptionError::Forbidden {
                    status: status.as_u16(),
                    message,
                }
            }
            Failure::Status { status, message } => SubscriptionError::Rejected {
                status: status.as_u16(),
                message,
            },
        }
    }
}

impl From<Failure> for FetchError {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Auth(e) => FetchError::Auth(e),
            Failure::Transport(e) => FetchError::Transport(e),
            Failure::Status { status, message } => FetchError::Rejected {
                status: status.as_u16(),
                message,
            },
        }
    }
}

/// Graph client authenticated with the application token.
pub struct GraphClient {
    client: Client,
    credentials: Arc<CredentialCache>,
    base_url: String,
    mailbox: String,
}

impl GraphClient {
    pub fn new(client: Client, credentials: Arc<CredentialCache>, config: GraphConfig) -> Self {
        Self {
            client,
            credentials,
            base_url: config.base_url,
            mailbox: config.mailbox,
        }
    }

    /// Builds `{base}/{segments...}` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, Failure> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Failure::Transport(format!("invalid Graph base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| Failure::Transport("Graph base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends an authorized request. A 401 drops the cached token and the
    /// request is retried once with a fresh one.
    async fn execute<F>(&self, build: F) -> Result<Response, Failure>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let mut retried = false;
        loop {
            let token = self.credentials.get_token().await.map_err(Failure::Auth)?;
            let response = build(&self.client)
                .bearer_auth(token.bearer())
                .send()
                .await
                .map_err(|e| Failure::Transport(e.to_string()))?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED && !retried {
                debug!("Graph answered 401, refreshing token");
                self.credentials.invalidate().await;
                retried = true;
                continue;
            }
            if status.is_success() {
                return Ok(response);
            }

            let body = response.text().await.unwrap_or_default();
            return Err(Failure::Status {
                status,
                message: sanitize::truncate_error_body(&body),
            });
        }
    }
}

#[async_trait]
impl SubscriptionApi for GraphClient {
    #[instrument(skip_all, fields(resource = %request.resource))]
    async fn create_subscription(
        &self,
        request: &SubscriptionRequest<'_>,
    ) -> Result<RemoteSubscription, SubscriptionError> {
        let url = self.endpoint(&["subscriptions"])?;
        let body = CreateSubscriptionBody::from(request);
        let response = self
            .execute(|client| client.post(url.clone()).json(&body))
            .await?;
        let created: RemoteSubscription = response
            .json()
            .await
            .map_err(|e| SubscriptionError::InvalidResponse(e.to_string()))?;
        debug!(id = %created.id, expires = %created.expiration_date_time, "Subscription created");
        Ok(created)
    }

    async fn list_subscriptions(&self) -> Result<Vec<RemoteSubscription>, SubscriptionError> {
        let url = self.endpoint(&["subscriptions"])?;
        let response = self.execute(|client| client.get(url.clone())).await?;
        let list: SubscriptionList = response
            .json()
            .await
            .map_err(|e| SubscriptionError::InvalidResponse(e.to_string()))?;
        Ok(list.value)
    }

    #[instrument(skip(self), fields(id = %sanitize::short_id(id)))]
    async fn renew_subscription(
        &self,
        id: &str,
        expiration: DateTime<Utc>,
    ) -> Result<RemoteSubscription, SubscriptionError> {
        let url = self.endpoint(&["subscriptions", id])?;
        let body = RenewSubscriptionBody {
            expiration_date_time: format_expiration(expiration),
        };
        let response = match self
            .execute(|client| client.patch(url.clone()).json(&body))
            .await
        {
            Err(Failure::Status { status, .. }) if status == StatusCode::NOT_FOUND => {
                return Err(SubscriptionError::NotFound { id: id.to_string() })
            }
            other => other?,
        };
        response
            .json()
            .await
            .map_err(|e| SubscriptionError::InvalidResponse(e.to_string()))
    }

    #[instrument(skip(self), fields(id = %sanitize::short_id(id)))]
    async fn delete_subscription(&self, id: &str) -> Result<(), SubscriptionError> {
        let url = self.endpoint(&["subscriptions", id])?;
        match self.execute(|client| client.delete(url.clone())).await {
            Ok(_) => Ok(()),
            Err(Failure::Status { status, .. }) if status == StatusCode::NOT_FOUND => {
                Err(SubscriptionError::NotFound { id: id.to_string() })
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl MessageSource for GraphClient {
    #[instrument(skip(self), fields(message_id = %sanitize::short_id(message_id)))]
    async fn fetch_message(&self, message_id: &str) -> Result<InboundEmail, FetchError> {
        let url = self.endpoint(&["users", &self.mailbox, "messages", message_id])?;
        let response = match self
            .execute(|client| {
                client
                    .get(url.clone())
                    .query(&[("$select", MESSAGE_SELECT)])
                    .header("Prefer", PREFER_TEXT_BODY)
            })
            .await
        {
            Err(Failure::Status { status, .. }) if status == StatusCode::NOT_FOUND => {
                warn!("Message disappeared before it could be read");
                return Err(FetchError::Gone {
                    message_id: message_id.to_string(),
                });
            }
            other => other?,
        };
        let message: GraphMessage = response
            .json()
            .await
            .map_err(|e| FetchError::InvalidResponse(e.to_string()))?;
        Ok(message.into_inbound(message_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::auth::{AccessToken, TokenExchange};
    use secrecy::SecretString;

    struct StaticToken;

    #[async_trait]
    impl TokenExchange for StaticToken {
        async fn exchange(&self) -> Result<AccessToken, AuthError> {
            let now = Utc::now();
            Ok(AccessToken::new(
                SecretString::from("t"),
                now,
                now + chrono::Duration::hours(1),
            ))
        }
    }

    fn client(base_url: &str) -> GraphClient {
        GraphClient::new(
            Client::new(),
            Arc::new(CredentialCache::new(Arc::new(StaticToken))),
            GraphConfig {
                base_url: base_url.to_string(),
                mailbox: "support@example.com".to_string(),
            },
        )
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let graph = client("https://graph.microsoft.com/v1.0/");
        let url = graph
            .endpoint(&["users", "support@example.com", "messages", "AAMk/abc="])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://graph.microsoft.com/v1.0/users/support@example.com/messages/AAMk%2Fabc="
        );
    }

    #[test]
    fn test_status_mapping() {
        let forbidden: SubscriptionError = Failure::Status {
            status: StatusCode::FORBIDDEN,
            message: "Insufficient privileges".into(),
        }
        .into();
        assert!(matches!(forbidden, SubscriptionError::Forbidden { status: 403, .. }));

        let rejected: SubscriptionError = Failure::Status {
            status: StatusCode::BAD_REQUEST,
            message: "Subscription validation request failed".into(),
        }
        .into();
        assert!(matches!(rejected, SubscriptionError::Rejected { status: 400, .. }));

        let fetch: FetchError = Failure::Transport("reset".into()).into();
        assert!(matches!(fetch, FetchError::Transport(_)));
    }

    #[tokio::test]
    async fn test_unreachable_graph_is_transport_error() {
        let graph = client("http://127.0.0.1:9");
        let err = graph.list_subscriptions().await.unwrap_err();
        assert!(matches!(err, SubscriptionError::Transport(_)));
    }
}
