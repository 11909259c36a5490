use super::EmailMessage;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{info, instrument};
use ulid::Ulid;
use url::Url;

/// Acknowledgment returned by a transport once it accepted a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub message_id: String,
}

/// Delivery abstraction used by the dispatcher.
#[async_trait]
pub trait EmailTransport: Send + Sync + fmt::Debug {
    /// Deliver a message or return the transport's error.
    async fn send(&self, message: &EmailMessage) -> Result<DeliveryReceipt>;
}

/// Local dev transport that logs the message instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogTransport;

#[async_trait]
impl EmailTransport for LogTransport {
    async fn send(&self, message: &EmailMessage) -> Result<DeliveryReceipt> {
        let message_id = Ulid::new().to_string();
        info!(
            message_id = %message_id,
            from = %message.from,
            to = %message.to,
            subject = %message.subject,
            text = %message.text,
            "email send stub"
        );
        Ok(DeliveryReceipt { message_id })
    }
}

/// Posts messages as JSON to a mail relay.
///
/// The relay answers `2xx` with `{"id": ".."}` (or `{"messageId": ".."}`);
/// anything else is an error carrying the relay's status and message.
pub struct HttpTransport {
    url: Url,
    token: Option<SecretString>,
    client: Client,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("url", &self.url.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// # Errors
    /// Returns an error if the URL is not http(s) or the client cannot be built.
    pub fn new(url: &str, token: Option<SecretString>) -> Result<Self> {
        let url = Url::parse(url).with_context(|| format!("Invalid email server URL: {url}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "Email server URL must use http or https: {}",
                url.as_str()
            ));
        }

        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .build()
            .context("Failed to build email HTTP client")?;

        Ok(Self { url, token, client })
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl EmailTransport for HttpTransport {
    #[instrument(skip(self, message), fields(url = %self.url))]
    async fn send(&self, message: &EmailMessage) -> Result<DeliveryReceipt> {
        let mut request = self.client.post(self.url.clone()).json(message);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach email server {}", self.url))?;

        if !response.status().is_success() {
            let status = response.status();
            let json_response: Value = response.json().await.unwrap_or(Value::Null);
            let error_message = json_response["error"]
                .as_str()
                .or_else(|| json_response["message"].as_str())
                .unwrap_or_default();

            return Err(anyhow!("{} - {}, {}", self.url, status, error_message));
        }

        let json_response: Value = response
            .json()
            .await
            .context("Error parsing email server response")?;

        json_response["id"]
            .as_str()
            .or_else(|| json_response["messageId"].as_str())
            .map(|id| DeliveryReceipt {
                message_id: id.to_string(),
            })
            .ok_or_else(|| anyhow!("Error parsing JSON response: no message id found"))
    }
}
