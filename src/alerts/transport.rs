//! Notification transports
//!
//! The engine composes a [`Notification`] and hands it to a [`Transport`].
//! Two implementations ship with the crate:
//!
//! - [`SmtpTransport`]: authenticated STARTTLS session to a mail relay
//! - [`WebhookTransport`]: JSON POST to an HTTP endpoint

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MailAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::Client;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::config::{SmtpConfig, TransportConfig, WebhookConfig};
use crate::error::TransportError;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content: Vec<u8>,
}

/// A fully composed alert, ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachment: Option<Attachment>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), TransportError>;
}

pub fn build_transport(config: &TransportConfig) -> Result<Box<dyn Transport>, TransportError> {
    match config {
        TransportConfig::Smtp(smtp) => Ok(Box::new(SmtpTransport::new(smtp)?)),
        TransportConfig::Webhook(webhook) => Ok(Box::new(WebhookTransport::new(webhook)?)),
    }
}

pub struct SmtpTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    pub fn new(config: &SmtpConfig) -> Result<Self, TransportError> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?.port(config.port);

        match config.password() {
            Some(password) => {
                builder = builder.credentials(Credentials::new(config.username.clone(), password));
            }
            None => warn!(
                "no SMTP password configured for {}, relay will likely refuse",
                config.username
            ),
        }

        debug!("using SMTP relay {}:{}", config.host, config.port);
        Ok(Self {
            mailer: builder.build(),
        })
    }
}

pub fn build_message(notification: &Notification) -> Result<Message, TransportError> {
    let mut builder = Message::builder()
        .from(notification.from.parse::<Mailbox>()?)
        .subject(notification.subject.clone());
    for recipient in &notification.to {
        builder = builder.to(recipient.parse::<Mailbox>()?);
    }

    let message = match &notification.attachment {
        Some(attachment) => {
            let content_type = ContentType::parse("application/octet-stream")
                .map_err(|e| TransportError::InvalidMessage(e.to_string()))?;
            builder.multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(notification.body.clone()))
                    .singlepart(
                        MailAttachment::new(attachment.filename.clone())
                            .body(attachment.content.clone(), content_type),
                    ),
            )?
        }
        None => builder.body(notification.body.clone())?,
    };

    Ok(message)
}

#[async_trait]
impl Transport for SmtpTransport {
    #[instrument(skip_all, fields(subject = %notification.subject))]
    async fn send(&self, notification: &Notification) -> Result<(), TransportError> {
        let message = build_message(notification)?;
        self.mailer.send(message).await?;
        Ok(())
    }
}

pub struct WebhookTransport {
    client: Client,
    url: String,
}

impl WebhookTransport {
    pub fn new(config: &WebhookConfig) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(WEBHOOK_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl Transport for WebhookTransport {
    #[instrument(skip_all, fields(subject = %notification.subject))]
    async fn send(&self, notification: &Notification) -> Result<(), TransportError> {
        let attachment = notification.attachment.as_ref().map(|attachment| {
            json!({
                "filename": attachment.filename,
                "content_base64": STANDARD.encode(&attachment.content),
            })
        });

        let payload = json!({
            "from": notification.from,
            "to": notification.to,
            "subject": notification.subject,
            "message": notification.body,
            "attachment": attachment,
            "timestamp": Utc::now().to_rfc3339()
        });

        let response = self.client.post(&self.url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(TransportError::Delivery(format!(
                "webhook answered with status {}",
                response.status()
            )));
        }

        Ok(())
    }
}
