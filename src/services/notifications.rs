//! Outbound email: a bounded in-process queue drained by one worker.
//!
//! The queue is not persistent. Messages still queued when the process
//! stops are lost, and callers re-trigger them.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use metrics::counter;
use rand::Rng;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tracing::{error, info, warn};

use crate::{config::AppConfig, errors::ServiceError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("email queue is full")]
    Full,
    #[error("email queue is closed")]
    Closed,
}

impl From<QueueError> for ServiceError {
    fn from(err: QueueError) -> Self {
        ServiceError::QueueError(err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("mail delivery failed: {0}")]
pub struct MailError(pub String);

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

/// Delivers through an SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(
        host: &str,
        port: u16,
        credentials: Option<(String, String)>,
        from: String,
    ) -> Result<Self, MailError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| MailError(format!("smtp relay {}: {}", host, e)))?
            .port(port);
        if let Some((user, password)) = credentials {
            builder = builder.credentials(Credentials::new(user, password));
        }
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        let email = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| MailError(format!("invalid from address: {}", e)))?,
            )
            .to(message
                .to
                .parse()
                .map_err(|e| MailError(format!("invalid recipient: {}", e)))?)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(message.html.clone())
            .map_err(|e| MailError(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map(|_| ())
            .map_err(|e| MailError(e.to_string()))
    }
}

/// Writes messages to the log instead of sending them. Used when no SMTP
/// host is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        info!(to = %message.to, subject = %message.subject, "email (not sent, no smtp host)");
        Ok(())
    }
}

/// Picks the SMTP mailer when a host is configured.
pub fn mailer_from_config(config: &AppConfig) -> Result<Arc<dyn Mailer>, MailError> {
    match &config.smtp_host {
        Some(host) => {
            let credentials = config
                .smtp_user
                .clone()
                .zip(config.smtp_password.clone());
            Ok(Arc::new(SmtpMailer::new(
                host,
                config.smtp_port,
                credentials,
                config.smtp_from.clone(),
            )?))
        }
        None => Ok(Arc::new(LogMailer)),
    }
}

#[derive(Clone)]
pub struct EmailQueue {
    sender: mpsc::Sender<EmailMessage>,
}

impl EmailQueue {
    /// Spawns the worker. The handle ends once every queue clone is dropped.
    pub fn start(mailer: Arc<dyn Mailer>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<EmailMessage>(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                match mailer.send(&message).await {
                    Ok(()) => {
                        counter!("kasir_email.sent", 1);
                    }
                    Err(err) => {
                        counter!("kasir_email.failed", 1);
                        error!(error = %err, to = %message.to, "email delivery failed");
                    }
                }
            }
            info!("email worker stopped");
        });
        (Self { sender }, worker)
    }

    /// Enqueues without waiting.
    pub fn enqueue(&self, message: EmailMessage) -> Result<(), QueueError> {
        self.sender.try_send(message).map_err(|err| match err {
            TrySendError::Full(message) => {
                warn!(to = %message.to, "email queue full");
                counter!("kasir_email.rejected", 1);
                QueueError::Full
            }
            TrySendError::Closed(_) => QueueError::Closed,
        })
    }
}

/// Six decimal digits, zero padded.
pub fn generate_otp() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

pub fn otp_email(to: &str, name: &str, code: &str) -> EmailMessage {
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>Kode verifikasi</title></head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
  <div style="max-width: 480px; margin: 0 auto; padding: 20px;">
    <p>Hi {name},</p>
    <p>Your verification code is:</p>
    <p style="font-size: 28px; letter-spacing: 6px; font-weight: bold;">{code}</p>
    <p style="color: #666; font-size: 13px;">If you did not request this code, ignore this email.</p>
  </div>
</body>
</html>"#
    );
    EmailMessage {
        to: to.to_string(),
        subject: "Your verification code".to_string(),
        html,
    }
}
