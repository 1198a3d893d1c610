//! Outbound notifications
//!
//! The lifecycle engine and alert evaluator talk to a [`Notifier`] through
//! [`NotificationService`], which bounds every send with a timeout and turns
//! failures into a logged `false`. Nothing here is ever raised to a caller.

use async_trait::async_trait;
use serde_json::json;
use std::{fmt, sync::Arc, time::Duration};
use thiserror::Error;

use crate::config::{NotifierConfig, TelegramConfig};

/// Recipient of a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    /// Shared supervisor channel configured on the transport
    Supervisor,
    /// A user's own contact channel (chat id or address)
    Direct(String),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Supervisor => write!(f, "supervisor"),
            Channel::Direct(to) => write!(f, "direct:{}", to),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("no address configured for {0}")]
    Unconfigured(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}

/// Transport that delivers a message to a channel
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, channel: &Channel, message: &str) -> Result<(), NotifyError>;
}

/// Writes notifications to the log only
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, channel: &Channel, message: &str) -> Result<(), NotifyError> {
        tracing::info!(channel = %channel, "notification: {}", message);
        Ok(())
    }
}

/// Telegram Bot API transport
#[derive(Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    supervisor_chat: Option<String>,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig, bot_token: String, supervisor_chat: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token,
            supervisor_chat,
        }
    }

    fn chat_id<'a>(&'a self, channel: &'a Channel) -> Result<&'a str, NotifyError> {
        match channel {
            Channel::Supervisor => self
                .supervisor_chat
                .as_deref()
                .ok_or_else(|| NotifyError::Unconfigured(channel.to_string())),
            Channel::Direct(chat) => Ok(chat.as_str()),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, channel: &Channel, message: &str) -> Result<(), NotifyError> {
        let chat_id = self.chat_id(channel)?;
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "chat_id": chat_id,
                "text": message,
                "parse_mode": "Markdown",
            }))
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Transport(format!("Telegram returned {}: {}", status, body)));
        }
        Ok(())
    }
}

/// Bounded, non-failing delivery on top of a transport
#[derive(Clone)]
pub struct NotificationService {
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
}

impl NotificationService {
    pub fn new(notifier: Arc<dyn Notifier>, config: &NotifierConfig) -> Self {
        Self {
            notifier,
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        }
    }

    /// Deliver a message; returns whether it went through
    pub async fn send(&self, channel: Channel, message: &str) -> bool {
        let outcome = match tokio::time::timeout(self.timeout, self.notifier.send(&channel, message)).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout(self.timeout)),
        };

        match outcome {
            Ok(()) => {
                tracing::debug!(channel = %channel, "notification delivered");
                true
            }
            Err(e) => {
                tracing::warn!(channel = %channel, "Failed to deliver notification: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(timeout_secs: u64) -> NotifierConfig {
        NotifierConfig {
            timeout_secs,
            ..NotifierConfig::default()
        }
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let mut mock = MockNotifier::new();
        mock.expect_send()
            .times(1)
            .returning(|_, _| Err(NotifyError::Transport("connection refused".into())));

        let service = NotificationService::new(Arc::new(mock), &config(1));
        assert!(!service.send(Channel::Supervisor, "hello").await);
    }

    #[tokio::test]
    async fn test_channel_is_passed_through() {
        let mut mock = MockNotifier::new();
        mock.expect_send()
            .withf(|channel, message| {
                *channel == Channel::Direct("4242".into()) && message.contains("TW-001")
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let service = NotificationService::new(Arc::new(mock), &config(1));
        assert!(service.send(Channel::Direct("4242".into()), "TW-001 held").await);
    }

    struct Stalled;

    #[async_trait]
    impl Notifier for Stalled {
        async fn send(&self, _: &Channel, _: &str) -> Result<(), NotifyError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_transport_times_out() {
        let service = NotificationService::new(Arc::new(Stalled), &config(2));
        assert!(!service.send(Channel::Supervisor, "hello").await);
    }

    #[tokio::test]
    async fn test_telegram_needs_supervisor_chat() {
        let notifier = TelegramNotifier::new(&TelegramConfig::default(), "token".into(), None);
        assert!(matches!(
            notifier.send(&Channel::Supervisor, "hello").await,
            Err(NotifyError::Unconfigured(_))
        ));
    }
}
