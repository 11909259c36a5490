//! Outgoing email.
//!
//! [`EmailDispatcher`] is the only way mail leaves the service. It checks the
//! recipient with [`valid_email`] before anything else, stamps every message
//! with the configured [`Sender`], and makes exactly one transport attempt.
//! Delivery itself is delegated to an [`EmailTransport`].
pub mod transport;

pub use transport::{DeliveryReceipt, EmailTransport, HttpTransport, LogTransport};

use regex::Regex;
use serde::Serialize;
use std::{fmt, sync::Arc};
use thiserror::Error;
use tracing::{debug, instrument};

/// Display name used for every outgoing message.
pub const SENDER_NAME: &str = "fluent-flow";

/// Lightweight email sanity check: a local part, `@`, and a dotted domain.
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),
    #[error(transparent)]
    Transport(anyhow::Error),
}

/// Fixed sender identity, rendered as `"name" <address>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sender {
    name: String,
    address: String,
}

impl Sender {
    #[must_use]
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" <{}>", self.name, self.address)
    }
}

/// Message handed to a transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[derive(Clone, Debug)]
pub struct EmailDispatcher {
    sender: Sender,
    transport: Arc<dyn EmailTransport>,
}

impl EmailDispatcher {
    #[must_use]
    pub fn new(sender: Sender, transport: Arc<dyn EmailTransport>) -> Self {
        Self { sender, transport }
    }

    #[must_use]
    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    /// Send one message.
    ///
    /// # Errors
    /// `InvalidRecipient` when `to` is not an email address (the transport is
    /// not called), `Transport` with the transport's own error otherwise.
    #[instrument(skip(self, text, html))]
    pub async fn send(
        &self,
        to: &str,
        subject: &str,
        text: &str,
        html: &str,
    ) -> Result<DeliveryReceipt, EmailError> {
        if !valid_email(to) {
            return Err(EmailError::InvalidRecipient(to.to_string()));
        }

        let message = EmailMessage {
            from: self.sender.to_string(),
            to: to.to_string(),
            subject: subject.to_string(),
            text: text.to_string(),
            html: html.to_string(),
        };

        let receipt = self
            .transport
            .send(&message)
            .await
            .map_err(EmailError::Transport)?;

        debug!(message_id = %receipt.message_id, "email accepted by transport");

        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<EmailMessage>>,
    }

    impl RecordingTransport {
        fn sent(&self) -> Vec<EmailMessage> {
            self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl EmailTransport for RecordingTransport {
        async fn send(&self, message: &EmailMessage) -> Result<DeliveryReceipt> {
            let mut sent = self.sent.lock().map_err(|_| anyhow!("poisoned"))?;
            sent.push(message.clone());
            Ok(DeliveryReceipt {
                message_id: format!("msg-{}", sent.len()),
            })
        }
    }

    #[derive(Debug)]
    struct FailingTransport;

    #[async_trait]
    impl EmailTransport for FailingTransport {
        async fn send(&self, _message: &EmailMessage) -> Result<DeliveryReceipt> {
            Err(anyhow!("relay refused connection"))
        }
    }

    fn dispatcher(transport: Arc<dyn EmailTransport>) -> EmailDispatcher {
        EmailDispatcher::new(Sender::new(SENDER_NAME, "noreply@fluent-flow.dev"), transport)
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("user@example.com"));
        assert!(valid_email("name.surname+tag@mail.example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("user@localhost"));
        assert!(!valid_email("@example.com"));
        assert!(!valid_email("user@"));
        assert!(!valid_email("user @example.com"));
        assert!(!valid_email("user@@example.com"));
        assert!(!valid_email(""));
    }

    #[test]
    fn sender_renders_display_name() {
        let sender = Sender::new(SENDER_NAME, "noreply@fluent-flow.dev");
        assert_eq!(sender.to_string(), "\"fluent-flow\" <noreply@fluent-flow.dev>");
    }

    #[tokio::test]
    async fn invalid_recipient_never_reaches_transport() {
        let transport = Arc::new(RecordingTransport::default());
        let result = dispatcher(transport.clone())
            .send("not-an-email", "S", "T", "<p>T</p>")
            .await;

        assert!(matches!(result, Err(EmailError::InvalidRecipient(ref to)) if to == "not-an-email"));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn valid_recipient_sends_once_with_fixed_sender() -> Result<()> {
        let transport = Arc::new(RecordingTransport::default());
        let receipt = dispatcher(transport.clone())
            .send("user@example.com", "S", "T", "<p>T</p>")
            .await?;

        assert_eq!(receipt.message_id, "msg-1");
        assert_eq!(
            transport.sent(),
            vec![EmailMessage {
                from: "\"fluent-flow\" <noreply@fluent-flow.dev>".to_string(),
                to: "user@example.com".to_string(),
                subject: "S".to_string(),
                text: "T".to_string(),
                html: "<p>T</p>".to_string(),
            }]
        );
        Ok(())
    }

    #[tokio::test]
    async fn transport_error_is_returned_unchanged() {
        let result = dispatcher(Arc::new(FailingTransport))
            .send("user@example.com", "S", "T", "<p>T</p>")
            .await;

        match result {
            Err(EmailError::Transport(err)) => {
                assert_eq!(err.to_string(), "relay refused connection");
            }
            other => panic!("expected transport error, got {other:?}"),
        }
    }
}
