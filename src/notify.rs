use crate::appointment::Attachment;
use crate::config::MailConfig;
use lettre::message::header::{ContentTransferEncoding, ContentType};
use lettre::message::{Attachment as MimeAttachment, Body, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const RELAY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("invalid mailbox {address:?}: {reason}")]
    Address { address: String, reason: String },
    #[error("invalid attachment content type {0:?}")]
    ContentType(String),
    #[error("could not encode attachment {0:?}")]
    Encoding(String),
    #[error("could not build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("mail relay failed: {0}")]
    Relay(String),
}

/// One plain-text email ready to be handed to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone)]
pub struct MessagePair {
    pub to_provider: OutboundMessage,
    pub confirmation: OutboundMessage,
}

#[tonic::async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), DeliveryError>;
}

/// Authenticated STARTTLS submission. Every message gets its own
/// connect / authenticate / send / quit cycle.
pub struct SmtpRelay {
    config: MailConfig,
    from: Mailbox,
}

impl SmtpRelay {
    pub fn new(config: MailConfig) -> Result<Self, DeliveryError> {
        let from = parse_mailbox(&config.from)?;
        Ok(Self { config, from })
    }

    fn build(&self, message: &OutboundMessage) -> Result<Message, DeliveryError> {
        let builder = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(&message.to)?)
            .subject(message.subject.clone());
        let text = SinglePart::plain(message.body.clone());

        if message.attachments.is_empty() {
            return Ok(builder.singlepart(text)?);
        }

        let mut parts = MultiPart::mixed().singlepart(text);
        for attachment in &message.attachments {
            let content_type = ContentType::parse(&attachment.content_type)
                .map_err(|_| DeliveryError::ContentType(attachment.content_type.clone()))?;
            // Always base64, even when the bytes happen to be plain ASCII.
            let body = Body::new_with_encoding(
                attachment.data.clone(),
                ContentTransferEncoding::Base64,
            )
            .map_err(|_| DeliveryError::Encoding(attachment.filename.clone()))?;
            parts = parts.singlepart(
                MimeAttachment::new(attachment.filename.clone()).body(body, content_type),
            );
        }
        Ok(builder.multipart(parts)?)
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    address.parse().map_err(|e: lettre::address::AddressError| DeliveryError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

#[tonic::async_trait]
impl MailTransport for SmtpRelay {
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        let email = self.build(message)?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
            .map_err(|e| DeliveryError::Relay(e.to_string()))?
            .port(self.config.port)
            .credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ))
            .timeout(Some(RELAY_TIMEOUT))
            .build();

        transport
            .send(email)
            .await
            .map_err(|e| DeliveryError::Relay(e.to_string()))?;
        Ok(())
    }
}

/// Result of a pair send in which the provider message went out.
#[derive(Debug)]
pub struct PairReport {
    pub confirmation: Result<(), DeliveryError>,
}

pub struct NotificationService {
    transport: Arc<dyn MailTransport>,
}

impl NotificationService {
    pub fn new(transport: Arc<dyn MailTransport>) -> Self {
        Self { transport }
    }

    /// Sends the provider message, then the confirmation.
    ///
    /// A failed provider send is returned as `Err` and no confirmation is
    /// attempted. A failed confirmation is reported in the `PairReport`.
    pub async fn send_pair(&self, pair: &MessagePair) -> Result<PairReport, DeliveryError> {
        if let Err(e) = self.transport.deliver(&pair.to_provider).await {
            warn!(error = %e, "provider notification failed, confirmation not sent");
            return Err(e);
        }
        info!(
            attachments = pair.to_provider.attachments.len(),
            "provider notification delivered"
        );

        let confirmation = self.transport.deliver(&pair.confirmation).await;
        match &confirmation {
            Ok(()) => info!("confirmation delivered"),
            Err(e) => warn!(error = %e, "confirmation failed after provider was notified"),
        }
        Ok(PairReport { confirmation })
    }
}
