use super::traits::{Notification, Notifier};
use crate::config::{EmailConfig, SmtpSecurity};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

const SMTP_TIMEOUT_SECS: u64 = 30;

/// SMTP notifier; mails go from the configured account to itself.
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    mailbox: Mailbox,
}

impl EmailNotifier {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let creds = Credentials::new(config.address.clone(), config.password.clone());

        let builder = match config.security {
            SmtpSecurity::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?,
            SmtpSecurity::Starttls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            }
            SmtpSecurity::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
            }
        };
        let transport = builder
            .port(config.smtp_port)
            .credentials(creds)
            .timeout(Some(Duration::from_secs(SMTP_TIMEOUT_SECS)))
            .build();

        let mailbox: Mailbox = config
            .address
            .parse()
            .map_err(|e| anyhow!("invalid email address '{}': {}", config.address, e))?;

        Ok(Self { transport, mailbox })
    }

    /// Build the outgoing message. `attachment` is `(file name, PNG bytes)`.
    pub fn build_message(
        &self,
        notification: &Notification,
        attachment: Option<(String, Vec<u8>)>,
    ) -> Result<Message> {
        let builder = Message::builder()
            .from(self.mailbox.clone())
            .to(self.mailbox.clone())
            .subject(notification.subject.clone());

        let message = match attachment {
            Some((file_name, bytes)) => {
                let png = ContentType::parse("image/png")
                    .map_err(|e| anyhow!("invalid attachment content type: {e}"))?;
                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::plain(notification.body.clone()))
                        .singlepart(Attachment::new(file_name).body(bytes, png)),
                )?
            }
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(notification.body.clone())?,
        };
        Ok(message)
    }
}

async fn load_attachment(path: &Path) -> Option<(String, Vec<u8>)> {
    let file_name = path
        .file_name()
        .map_or_else(|| "screenshot.png".to_string(), |n| n.to_string_lossy().to_string());
    match tokio::fs::read(path).await {
        Ok(bytes) => Some((file_name, bytes)),
        Err(e) => {
            warn!(file = %path.display(), "Screenshot not attached: {e}");
            None
        }
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let attachment = match notification.artifact() {
            Some(path) => load_attachment(path).await,
            None => None,
        };
        let message = self.build_message(notification, attachment)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| anyhow!("SMTP send failed: {e}"))?;

        info!(subject = %notification.subject, "Email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::traits::NotificationKind;

    fn notifier() -> EmailNotifier {
        EmailNotifier::new(&EmailConfig {
            smtp_host: "localhost".into(),
            smtp_port: 2525,
            security: SmtpSecurity::None,
            address: "me@example.com".into(),
            password: "secret".into(),
        })
        .unwrap()
    }

    #[test]
    fn rejects_invalid_address() {
        let result = EmailNotifier::new(&EmailConfig {
            smtp_host: "localhost".into(),
            address: "not-an-address".into(),
            security: SmtpSecurity::None,
            ..EmailConfig::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn plain_message_is_addressed_to_self() {
        let n = Notification::update("Portal", &"May 2, 2024".into());
        let formatted =
            String::from_utf8(notifier().build_message(&n, None).unwrap().formatted()).unwrap();

        assert!(formatted.contains("From: me@example.com"));
        assert!(formatted.contains("To: me@example.com"));
        assert!(formatted.contains("Subject: Portal Update"));
        assert!(formatted.contains("The portal was updated on May 2, 2024."));
    }

    #[test]
    fn attachment_becomes_png_part() {
        let n = Notification {
            kind: NotificationKind::NoUpdate,
            subject: "Portal Status".into(),
            body: "nothing new".into(),
            artifact: None,
        };
        let message = notifier()
            .build_message(&n, Some(("20240101000000-no_update.png".into(), vec![0x89, b'P'])))
            .unwrap();
        let formatted = String::from_utf8_lossy(&message.formatted()).to_string();

        assert!(formatted.contains("multipart/mixed"));
        assert!(formatted.contains("image/png"));
        assert!(formatted.contains("20240101000000-no_update.png"));
        assert!(formatted.contains("nothing new"));
    }

    #[tokio::test]
    async fn unreadable_artifact_is_skipped() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(load_attachment(&tmp.path().join("missing.png")).await.is_none());

        let path = tmp.path().join("shot.png");
        std::fs::write(&path, b"png").unwrap();
        let (name, bytes) = load_attachment(&path).await.unwrap();
        assert_eq!(name, "shot.png");
        assert_eq!(bytes, b"png");
    }
}
