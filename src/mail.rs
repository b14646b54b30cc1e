use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType, transport::smtp::authentication::Credentials,
};
use thiserror::Error;

use crate::config::SmtpConfig;

/// OutgoingMail
///
/// A plain-text message addressed to a single recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl OutgoingMail {
    /// The signup confirmation message carrying the code for the token exchange.
    pub fn confirmation_code(to: &str, username: &str, code: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "YaMDb confirmation code".to_string(),
            body: format!(
                "Hello, {username}!\n\nYour confirmation code: {code}\n\n\
                 Exchange it for an access token at /v1/auth/token/."
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Mailer
///
/// Outgoing mail seam. Delivery is awaited; nothing is retried.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

pub type MailerState = Arc<dyn Mailer>;

/// SmtpMailer
///
/// Delivers over SMTP with STARTTLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig, from: &str) -> Result<Self, MailError> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)?
            .credentials(creds)
            .port(config.port)
            .build();
        Ok(Self {
            transport,
            from: from.to_string(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.from.parse()?)
            .to(mail.to.parse()?)
            .subject(mail.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body)?;

        self.transport.send(message).await?;
        tracing::info!("Mail sent to {}", mail.to);
        Ok(())
    }
}

/// MemoryMailer
///
/// Keeps every message in an outbox and writes it to the log. Used in local mode
/// without SMTP and by the tests, which read confirmation codes back from the outbox.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    outbox: Mutex<Vec<OutgoingMail>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Test support: reading the outbox back ---

    pub fn outbox(&self) -> Vec<OutgoingMail> {
        self.outbox.lock().map(|o| o.clone()).unwrap_or_default()
    }

    /// Most recent message sent to `to`.
    pub fn last_to(&self, to: &str) -> Option<OutgoingMail> {
        self.outbox().into_iter().rev().find(|m| m.to == to)
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        tracing::info!(to = %mail.to, subject = %mail.subject, "{}", mail.body);
        if let Ok(mut outbox) = self.outbox.lock() {
            outbox.push(mail);
        }
        Ok(())
    }
}

/// Test support. Extracts the confirmation code from a message built by
/// [`OutgoingMail::confirmation_code`], so integration tests can finish the signup flow.
pub fn code_from_body(body: &str) -> Option<&str> {
    body.lines()
        .find_map(|line| line.strip_prefix("Your confirmation code: "))
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_mailer_records_outbox() {
        let mailer = MemoryMailer::new();
        mailer
            .send(OutgoingMail::confirmation_code("a@example.com", "alice", "abc.def"))
            .await
            .unwrap();

        let mail = mailer.last_to("a@example.com").unwrap();
        assert_eq!(code_from_body(&mail.body), Some("abc.def"));
        assert!(mailer.last_to("b@example.com").is_none());
    }
}
