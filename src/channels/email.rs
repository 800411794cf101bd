//! Email notifier: delivers suspension alerts over SMTP via lettre.
//!
//! Outbound only. Alerts are chat-formatted, so Markdown markers are
//! stripped and the first line becomes the subject.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;

use crate::config::EmailNotifyConfig;
use crate::engine::Notifier;
use crate::error::ChannelError;

const SUBJECT_PREFIX: &str = "[eximmon]";

pub struct EmailNotifier {
    config: EmailNotifyConfig,
}

impl EmailNotifier {
    pub fn new(config: EmailNotifyConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, text: &str) -> Result<Message, ChannelError> {
        let from: Mailbox = self.config.from.parse().map_err(|e| {
            send_failed(format!("Invalid from address: {e}"))
        })?;
        let to: Mailbox = self
            .config
            .to
            .parse()
            .map_err(|e| send_failed(format!("Invalid to address: {e}")))?;

        let (subject, body) = subject_and_body(text);
        Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| send_failed(format!("Failed to build email: {e}")))
    }

    /// Relay with credentials when a username is configured; otherwise a
    /// plain connection to a local MTA.
    fn build_transport(&self) -> Result<SmtpTransport, ChannelError> {
        let transport = match &self.config.username {
            Some(username) => {
                let password = self
                    .config
                    .password
                    .as_ref()
                    .map(|p| p.expose_secret().to_string())
                    .unwrap_or_default();
                SmtpTransport::relay(&self.config.smtp_host)
                    .map_err(|e| send_failed(format!("SMTP relay error: {e}")))?
                    .port(self.config.smtp_port)
                    .credentials(Credentials::new(username.clone(), password))
                    .build()
            }
            None => SmtpTransport::builder_dangerous(&self.config.smtp_host)
                .port(self.config.smtp_port)
                .build(),
        };
        Ok(transport)
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    async fn send_notification(&self, text: &str) -> Result<(), ChannelError> {
        let message = self.build_message(text)?;
        let transport = self.build_transport()?;
        let to = self.config.to.clone();

        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| send_failed(format!("SMTP task failed: {e}")))?
            .map_err(|e| send_failed(format!("SMTP send failed: {e}")))?;

        tracing::info!("Email alert sent to {to}");
        Ok(())
    }
}

fn send_failed(reason: String) -> ChannelError {
    ChannelError::SendFailed {
        name: "email".into(),
        reason,
    }
}

/// Drop the Markdown emphasis and code markers chat alerts carry.
fn plain_text(text: &str) -> String {
    text.chars().filter(|c| !matches!(c, '*' | '`')).collect()
}

fn subject_and_body(text: &str) -> (String, String) {
    let plain = plain_text(text);
    let headline = plain.lines().find(|l| !l.trim().is_empty()).unwrap_or("Alert");
    (format!("{SUBJECT_PREFIX} {}", headline.trim()), plain)
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn config(username: Option<&str>) -> EmailNotifyConfig {
        EmailNotifyConfig {
            to: "ops@example.com".into(),
            from: "eximmon@mail.example.com".into(),
            smtp_host: "localhost".into(),
            smtp_port: 25,
            username: username.map(String::from),
            password: username.map(|_| SecretString::from("hunter2")),
        }
    }

    #[test]
    fn subject_is_first_line_without_markdown() {
        let (subject, body) =
            subject_and_body("🚨 *SPAM DETECTED*\n\n📧 Email: `spam@example.com`");
        assert_eq!(subject, "[eximmon] 🚨 SPAM DETECTED");
        assert_eq!(body, "🚨 SPAM DETECTED\n\n📧 Email: spam@example.com");
    }

    #[test]
    fn blank_text_gets_a_generic_subject() {
        let (subject, _) = subject_and_body("  \n");
        assert_eq!(subject, "[eximmon] Alert");
    }

    #[test]
    fn message_builds_with_valid_addresses() {
        let notifier = EmailNotifier::new(config(None));
        let message = notifier.build_message("✅ Email unsuspended: `a@example.com`").unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: ops@example.com"));
        assert!(raw.contains("From: eximmon@mail.example.com"));
    }

    #[test]
    fn invalid_recipient_is_a_send_failure() {
        let mut cfg = config(None);
        cfg.to = "not an address".into();
        let err = EmailNotifier::new(cfg).build_message("hi").unwrap_err();
        assert!(matches!(err, ChannelError::SendFailed { ref name, .. } if name == "email"));
    }

    #[test]
    fn transport_builds_with_and_without_credentials() {
        assert!(EmailNotifier::new(config(None)).build_transport().is_ok());
        assert!(EmailNotifier::new(config(Some("mailer"))).build_transport().is_ok());
    }
}
