/// Outbound email transport
use crate::config::EmailSettings;
use crate::error::{HookError, Result};
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::sync::Arc;
use tracing::{info, warn};

/// Fully rendered message ready for the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub recipient: String,
    pub subject: String,
    pub rendered_body: String,
}

/// Mail delivery capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, message: &OutboundEmail) -> Result<()>;
}

/// SMTP transport wrapper (SMTP or no-op)
#[derive(Clone)]
pub struct SmtpMailSender {
    transport: Option<Arc<AsyncSmtpTransport<Tokio1Executor>>>,
    from: Mailbox,
}

impl SmtpMailSender {
    /// Build the sender from configuration
    ///
    /// If SMTP host is empty, operates in no-op mode (logs only).
    pub fn new(config: &EmailSettings) -> Result<Self> {
        let from = config
            .smtp_from
            .parse::<Mailbox>()
            .map_err(|e| HookError::Configuration(format!("Invalid SMTP_FROM address: {}", e)))?;

        let transport = if config.smtp_host.trim().is_empty() {
            warn!("SMTP host not configured; email sender will operate in no-op mode");
            None
        } else {
            let builder = if config.use_starttls {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            }
            .map_err(|e| {
                HookError::Configuration(format!("Failed to configure SMTP transport: {}", e))
            })?
            .port(config.smtp_port);

            let builder = if let (Some(username), Some(password)) =
                (&config.smtp_username, &config.smtp_password)
            {
                builder.credentials(Credentials::new(username.to_string(), password.to_string()))
            } else {
                builder
            };

            Some(Arc::new(builder.build()))
        };

        Ok(Self { transport, from })
    }

    /// Check if SMTP transport is enabled
    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }
}

/// Build the lettre message; every failure carries the recipient.
fn compose(from: &Mailbox, message: &OutboundEmail) -> Result<Message> {
    let send_failure = |reason: String| HookError::SendFailure {
        recipient: message.recipient.clone(),
        reason,
    };

    let to = message
        .recipient
        .parse::<Mailbox>()
        .map_err(|e| send_failure(format!("Invalid recipient email address: {}", e)))?;

    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(message.subject.as_str())
        .header(header::ContentType::TEXT_PLAIN)
        .body(message.rendered_body.clone())
        .map_err(|e| send_failure(format!("Failed to build email message: {}", e)))
}

#[async_trait]
impl MailSender for SmtpMailSender {
    async fn send(&self, message: &OutboundEmail) -> Result<()> {
        let email = compose(&self.from, message)?;

        let Some(transport) = &self.transport else {
            info!(
                subject = %message.subject,
                recipient = %message.recipient,
                "Email sender running in no-op mode; skipping actual send"
            );
            return Ok(());
        };

        transport
            .send(email)
            .await
            .map_err(|e| HookError::SendFailure {
                recipient: message.recipient.clone(),
                reason: e.to_string(),
            })?;
        info!(subject = %message.subject, "email sent successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(smtp_host: &str) -> EmailSettings {
        EmailSettings {
            smtp_host: smtp_host.to_string(),
            smtp_port: 1025,
            smtp_username: None,
            smtp_password: None,
            smtp_from: "Auth <noreply@example.com>".to_string(),
            use_starttls: false,
        }
    }

    fn message(recipient: &str) -> OutboundEmail {
        OutboundEmail {
            recipient: recipient.to_string(),
            subject: "Confirm your signup".to_string(),
            rendered_body: "body".to_string(),
        }
    }

    #[tokio::test]
    async fn test_noop_mode_accepts_valid_recipient() {
        let sender = SmtpMailSender::new(&settings("")).unwrap();
        assert!(!sender.is_enabled());
        assert!(sender.send(&message("user@example.com")).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_send_failure() {
        let sender = SmtpMailSender::new(&settings("")).unwrap();
        let err = sender.send(&message("not-an-address")).await.unwrap_err();
        assert!(matches!(
            err,
            HookError::SendFailure { recipient, .. } if recipient == "not-an-address"
        ));
    }

    #[test]
    fn test_compose_failures_carry_recipient() {
        let from: Mailbox = "Auth <noreply@example.com>".parse().unwrap();

        let err = compose(&from, &message("no-at-sign")).unwrap_err();
        assert!(matches!(
            err,
            HookError::SendFailure { ref recipient, .. } if recipient == "no-at-sign"
        ));

        let email = compose(&from, &message("user@example.com")).unwrap();
        let raw = String::from_utf8(email.formatted()).unwrap();
        assert!(raw.contains("To: user@example.com"));
        assert!(raw.contains("Subject: Confirm your signup"));
    }

    #[test]
    fn test_invalid_from_is_configuration_error() {
        let mut config = settings("");
        config.smtp_from = "nope".to_string();
        assert!(matches!(
            SmtpMailSender::new(&config),
            Err(HookError::Configuration(_))
        ));
    }
}
