//! Outgoing mail. The SMTP transport is built once at startup, handed to the
//! handlers through `AppState`, and shut down when the server stops.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::{Mailbox, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

use crate::config::SmtpConfig;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(String),
    #[error("could not build message: {0}")]
    Build(String),
    #[error("smtp failure: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, text_body: &str) -> Result<(), MailError>;

    /// Release pooled connections. Default is a no-op.
    async fn shutdown(&self) {}
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> Result<Self, MailError> {
        let from: Mailbox = cfg.from.parse().map_err(|_| MailError::Address(cfg.from.clone()))?;
        // 465 is implicit TLS; anything else upgrades with STARTTLS.
        let builder = if cfg.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
        }
        .map_err(|e| MailError::Transport(e.to_string()))?;
        let transport = builder
            .port(cfg.port)
            .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
            .build();
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, text_body: &str) -> Result<(), MailError> {
        let to_box: Mailbox = to.parse().map_err(|_| MailError::Address(to.to_string()))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to_box)
            .subject(subject)
            .singlepart(SinglePart::plain(text_body.to_string()))
            .map_err(|e| MailError::Build(e.to_string()))?;
        match self.transport.send(message).await {
            Ok(_) => {
                info!(to, subject, "mail sent");
                Ok(())
            }
            Err(e) => {
                warn!(to, error = %e, "smtp send failed");
                Err(MailError::Transport(e.to_string()))
            }
        }
    }

    async fn shutdown(&self) {
        self.transport.shutdown().await;
        info!("smtp transport closed");
    }
}

/// Stand-in when SMTP is not configured: records that a mail would have
/// gone out, without the body.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, _text_body: &str) -> Result<(), MailError> {
        info!(to, subject, "smtp not configured; mail not delivered");
        Ok(())
    }
}

pub fn build_mailer(cfg: Option<&SmtpConfig>) -> Result<Arc<dyn Mailer>, MailError> {
    match cfg {
        Some(c) => Ok(Arc::new(SmtpMailer::new(c)?)),
        None => {
            warn!("SMTP_HOST/SMTP_USERNAME/SMTP_PASSWORD not set; OTP mails are only logged");
            Ok(Arc::new(LogMailer))
        }
    }
}
