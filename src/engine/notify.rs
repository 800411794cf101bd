//! Notification fan-out for suspensions decided outside the chat surface
//! (the spam detector).

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{info, warn};

use super::Engine;
use super::format;
use super::state::SuspensionRecord;
use crate::address::domain_of;
use crate::error::{ChannelError, Error};

/// A destination for alert messages (one chat or channel per transport).
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver `text` to the configured destination. Succeeds without
    /// sending when no destination is configured.
    async fn send_notification(&self, text: &str) -> Result<(), ChannelError>;
}

impl Engine {
    /// Record an automatic suspension and announce it everywhere.
    ///
    /// State is updated before delivery; a delivery failure is returned
    /// but never rolls the state back.
    pub async fn notify_suspension(&self, mut record: SuspensionRecord) -> Result<(), Error> {
        let domain = domain_of(&record.email)?;
        if record.domain.is_empty() {
            record.domain = domain.to_string();
        }

        {
            let mut state = self.state.write().await;
            state.suspended.insert(record.email.clone(), record.clone());
        }
        info!(
            email = %record.email,
            per_min = record.rate_per_minute,
            per_hour = record.rate_per_hour,
            reason = %record.reason,
            "Suspension recorded"
        );

        self.fan_out(&format::suspension_alert(&record)).await?;
        Ok(())
    }

    /// Record an automatic unsuspension and announce it everywhere.
    pub async fn notify_unsuspend(&self, email: &str) -> Result<(), Error> {
        {
            let mut state = self.state.write().await;
            state.suspended.remove(email);
        }
        info!(email, "Unsuspension recorded");

        self.fan_out(&format::unsuspend_alert(email)).await?;
        Ok(())
    }

    /// Send to every notifier concurrently; report the last failure.
    async fn fan_out(&self, text: &str) -> Result<(), ChannelError> {
        let results = join_all(
            self.notifiers
                .iter()
                .map(|n| async move { (n.name(), n.send_notification(text).await) }),
        )
        .await;

        let mut last_error = None;
        for (name, result) in results {
            if let Err(e) = result {
                warn!(notifier = name, error = %e, "Notification delivery failed");
                last_error = Some(e);
            }
        }
        last_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::Mutex;

    use super::*;
    use crate::engine::state::RuntimeConfig;
    use crate::engine::{Command, CommandKind, Platform};
    use crate::error::PanelError;
    use crate::panel::OutgoingSuspender;

    struct NoopPanel;

    #[async_trait]
    impl OutgoingSuspender for NoopPanel {
        async fn set_outgoing_suspended(&self, _email: &str, _suspended: bool) -> Result<(), PanelError> {
            Ok(())
        }
    }

    struct RecordingNotifier {
        name: &'static str,
        fail: bool,
        sent: Mutex<Vec<String>>,
    }

    impl RecordingNotifier {
        fn new(name: &'static str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail,
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn name(&self) -> &str {
            self.name
        }

        async fn send_notification(&self, text: &str) -> Result<(), ChannelError> {
            self.sent.lock().await.push(text.to_string());
            if self.fail {
                return Err(ChannelError::SendFailed {
                    name: self.name.into(),
                    reason: "boom".into(),
                });
            }
            Ok(())
        }
    }

    fn engine(notifiers: Vec<Arc<dyn Notifier>>) -> Engine {
        Engine::new(RuntimeConfig::default(), Arc::new(NoopPanel)).with_notifiers(notifiers)
    }

    fn detected(email: &str) -> SuspensionRecord {
        SuspensionRecord {
            email: email.into(),
            domain: String::new(),
            suspended_at: chrono::Utc::now(),
            reason: "rate limit exceeded".into(),
            rate_per_minute: 30,
            rate_per_hour: 400,
        }
    }

    #[tokio::test]
    async fn suspension_reaches_every_notifier() {
        let telegram = RecordingNotifier::new("telegram", false);
        let slack = RecordingNotifier::new("slack", false);
        let engine = engine(vec![telegram.clone(), slack.clone()]);

        engine.notify_suspension(detected("spam@example.com")).await.unwrap();

        for n in [&telegram, &slack] {
            let sent = n.sent.lock().await;
            assert_eq!(sent.len(), 1);
            assert!(sent[0].contains("spam@example.com"));
            assert!(sent[0].contains("30 emails/min"));
        }
        let state = engine.snapshot().await;
        assert_eq!(state.suspended["spam@example.com"].domain, "example.com");
    }

    #[tokio::test]
    async fn one_failure_does_not_block_the_other() {
        let telegram = RecordingNotifier::new("telegram", true);
        let slack = RecordingNotifier::new("slack", false);
        let engine = engine(vec![telegram.clone(), slack.clone()]);

        let err = engine
            .notify_suspension(detected("spam@example.com"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("telegram"));
        assert_eq!(slack.sent.lock().await.len(), 1);
        assert!(engine.snapshot().await.suspended.contains_key("spam@example.com"));
    }

    #[tokio::test]
    async fn last_failure_is_reported() {
        let engine = engine(vec![
            RecordingNotifier::new("telegram", true),
            RecordingNotifier::new("slack", true),
        ]);
        let err = engine.notify_unsuspend("spam@example.com").await.unwrap_err();
        assert!(matches!(err, Error::Channel(ChannelError::SendFailed { ref name, .. }) if name == "slack"), "{err}");
    }

    #[tokio::test]
    async fn unsuspend_updates_state_and_announces() {
        let slack = RecordingNotifier::new("slack", false);
        let engine = engine(vec![slack.clone()]);
        engine.notify_suspension(detected("spam@example.com")).await.unwrap();

        engine.notify_unsuspend("spam@example.com").await.unwrap();

        assert!(engine.suspended_emails().await.is_empty());
        let sent = slack.sent.lock().await;
        assert_eq!(sent.last().unwrap(), "✅ Email unsuspended: `spam@example.com`");
    }

    #[tokio::test]
    async fn list_reflects_detector_suspension() {
        let engine = engine(vec![RecordingNotifier::new("telegram", true)]);
        let _ = engine.notify_suspension(detected("spam@example.com")).await;

        let cmd = Command::new(CommandKind::List, vec![], Platform::Slack, "U1", "C1");
        assert!(engine.dispatch(&cmd).await.contains("spam@example.com"));
    }

    #[tokio::test]
    async fn invalid_record_is_rejected_without_state_change() {
        let telegram = RecordingNotifier::new("telegram", false);
        let engine = engine(vec![telegram.clone()]);
        let err = engine.notify_suspension(detected("garbage")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(engine.snapshot().await.suspended.is_empty());
        assert!(telegram.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn no_notifiers_is_fine() {
        let engine = engine(vec![]);
        engine.notify_suspension(detected("spam@example.com")).await.unwrap();
        assert_eq!(engine.suspended_emails().await, vec!["spam@example.com"]);
    }
}
