//! Transport trait and the message type every transport produces.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use tokio::sync::watch;

use crate::engine::{Notifier, Platform};
use crate::error::ChannelError;

/// Stream of inbound messages from one transport.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// Cooperative stop signal; flips to `true` once at shutdown.
pub type StopSignal = watch::Receiver<bool>;

/// Resolve once the stop signal fires or its sender is gone.
pub async fn wait_for_stop(stop: &mut StopSignal) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

/// A raw message received on a transport.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Transport name (`telegram`, `slack`, `cli`).
    pub channel: String,
    /// Platform identity of the sender, used for the admin gate.
    pub user_id: String,
    /// Where replies go.
    pub chat_id: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl IncomingMessage {
    pub fn new(
        channel: impl Into<String>,
        user_id: impl Into<String>,
        chat_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            user_id: user_id.into(),
            chat_id: chat_id.into(),
            text: text.into(),
            received_at: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A chat platform adapter.
///
/// `start` spawns the platform's receive loop and hands back its messages;
/// the loop must exit promptly once `stop` fires. Every transport is also a
/// [`Notifier`] for its configured alert destination.
#[async_trait]
pub trait Transport: Notifier {
    fn platform(&self) -> Platform;

    /// Whether `user_id` is on this platform's admin list.
    fn is_admin(&self, user_id: &str) -> bool;

    async fn start(&self, stop: StopSignal) -> Result<MessageStream, ChannelError>;

    async fn respond(&self, msg: &IncomingMessage, text: &str) -> Result<(), ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError>;
}

/// Turn an mpsc receiver into a [`MessageStream`].
pub(crate) fn receiver_stream(
    rx: tokio::sync::mpsc::UnboundedReceiver<IncomingMessage>,
) -> MessageStream {
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|msg| (msg, rx))
    });
    Box::pin(stream)
}
