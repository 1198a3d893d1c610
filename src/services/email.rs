//! SMTP notification transport

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};
use std::str::FromStr;

use super::notifier::{Channel, Notifier, NotifyError};
use crate::config::EmailConfig;

#[derive(Clone)]
pub struct EmailNotifier {
    config: EmailConfig,
    supervisor_address: Option<String>,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig, supervisor_address: Option<String>) -> Self {
        Self {
            config,
            supervisor_address,
        }
    }

    fn build_message(&self, to: &str, body: &str) -> Result<Message, NotifyError> {
        let from_name = self.config.smtp_from_name.as_deref().unwrap_or("Toolcrib");
        let from_mailbox = Mailbox::from_str(&format!("{} <{}>", from_name, self.config.smtp_from))
            .map_err(|e| NotifyError::Transport(format!("Invalid from address: {}", e)))?;
        let to_mailbox = Mailbox::from_str(to)
            .map_err(|e| NotifyError::Transport(format!("Invalid to address: {}", e)))?;

        // First line of the notice doubles as the subject
        let subject = body
            .lines()
            .next()
            .map(|line| line.trim_matches(|c| c == '*' || c == ' '))
            .filter(|line| !line.is_empty())
            .unwrap_or("Toolcrib notification")
            .to_string();

        Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(format!(
                                r#"<html><body><pre>{}</pre></body></html>"#,
                                body.replace('\n', "<br>")
                            )),
                    ),
            )
            .map_err(|e| NotifyError::Transport(format!("Failed to build email: {}", e)))
    }

    fn mailer(&self) -> Result<SmtpTransport, NotifyError> {
        let builder = if self.config.smtp_use_tls {
            SmtpTransport::starttls_relay(&self.config.smtp_host)
                .map_err(|e| NotifyError::Transport(format!("Failed to create SMTP transport: {}", e)))?
        } else {
            SmtpTransport::builder_dangerous(&self.config.smtp_host)
        }
        .port(self.config.smtp_port);

        let builder = match (&self.config.smtp_username, &self.config.smtp_password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => builder,
        };

        Ok(builder.build())
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, channel: &Channel, message: &str) -> Result<(), NotifyError> {
        let to = match channel {
            Channel::Supervisor => self
                .supervisor_address
                .clone()
                .ok_or_else(|| NotifyError::Unconfigured(channel.to_string()))?,
            Channel::Direct(address) => address.clone(),
        };

        let email = self.build_message(&to, message)?;
        let mailer = self.mailer()?;

        // lettre's SMTP transport is blocking
        tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| NotifyError::Transport(format!("Mail task failed: {}", e)))?
            .map_err(|e| NotifyError::Transport(format!("Failed to send email: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_comes_from_first_line() {
        let notifier = EmailNotifier::new(EmailConfig::default(), None);
        let message = notifier
            .build_message("lead@workshop.test", "*Tool held 9.0h*\nTW-001 by Ana")
            .unwrap();
        let headers = String::from_utf8(message.formatted()).unwrap();
        assert!(headers.contains("Subject: Tool held 9.0h"));
    }

    #[test]
    fn test_invalid_recipient_is_a_transport_error() {
        let notifier = EmailNotifier::new(EmailConfig::default(), None);
        assert!(matches!(
            notifier.build_message("not an address", "hello"),
            Err(NotifyError::Transport(_))
        ));
    }
}
