//! Slack transport over the Web API.
//!
//! Outbound goes through `chat.postMessage`. Inbound polls
//! `conversations.history` on each listen channel and forwards new human
//! messages that look like commands.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::channel::{
    IncomingMessage, MessageStream, StopSignal, Transport, receiver_stream, wait_for_stop,
};
use crate::config::SlackConfig;
use crate::engine::{Notifier, Platform};
use crate::error::ChannelError;

const SLACK_API_BASE: &str = "https://slack.com/api";

/// Messages fetched per history call.
const HISTORY_PAGE_SIZE: u32 = 100;

/// History pages read per channel per poll before the backlog is cut off.
const MAX_HISTORY_PAGES: usize = 10;

/// Envelope shared by every Web API response.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthTestResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    messages: Vec<SlackMessage>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

impl HistoryResponse {
    /// Cursor for the next page while Slack reports more messages.
    fn next_cursor(&self) -> Option<&str> {
        if !self.has_more {
            return None;
        }
        self.response_metadata
            .as_ref()
            .map(|m| m.next_cursor.as_str())
            .filter(|c| !c.is_empty())
    }
}

/// Reads one channel's `conversations.history`, following pagination.
struct HistoryReader {
    client: reqwest::Client,
    token: SecretString,
    url: String,
}

impl HistoryReader {
    async fn page(
        &self,
        channel: &str,
        oldest: &str,
        cursor: Option<&str>,
    ) -> Result<HistoryResponse, String> {
        let limit = HISTORY_PAGE_SIZE.to_string();
        let mut query = vec![("channel", channel), ("oldest", oldest), ("limit", limit.as_str())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor));
        }

        let history: HistoryResponse = self
            .client
            .get(&self.url)
            .bearer_auth(self.token.expose_secret())
            .query(&query)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?
            .json()
            .await
            .map_err(|e| format!("bad response: {e}"))?;

        if !history.ok {
            return Err(history.error.unwrap_or_else(|| "unknown".into()));
        }
        Ok(history)
    }

    /// Every message posted after `oldest`. A failed page fails the whole
    /// read so the caller's cursor stays put and the next poll retries.
    async fn since(&self, channel: &str, oldest: &str) -> Result<Vec<SlackMessage>, String> {
        let mut messages = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_HISTORY_PAGES {
            let page = self.page(channel, oldest, cursor.as_deref()).await?;
            cursor = page.next_cursor().map(String::from);
            messages.extend(page.messages);
            if cursor.is_none() {
                return Ok(messages);
            }
        }
        tracing::warn!(
            channel,
            pages = MAX_HISTORY_PAGES,
            kept = messages.len(),
            "Slack history backlog cut off; older messages skipped"
        );
        Ok(messages)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SlackMessage {
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: String,
    ts: String,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
}

pub struct SlackTransport {
    config: SlackConfig,
    client: reqwest::Client,
    api_base: String,
}

impl SlackTransport {
    pub fn new(config: SlackConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            api_base: SLACK_API_BASE.to_string(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/{method}", self.api_base)
    }

    /// Verify the token with `auth.test`; returns the bot's user name.
    pub async fn auth_test(&self) -> Result<String, ChannelError> {
        let resp: AuthTestResponse = self
            .client
            .post(self.api_url("auth.test"))
            .bearer_auth(self.config.bot_token.expose_secret())
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "slack".into(),
                reason: e.to_string(),
            })?
            .json()
            .await
            .map_err(|e| ChannelError::InvalidMessage(e.to_string()))?;

        if !resp.ok {
            return Err(ChannelError::AuthFailed {
                name: "slack".into(),
                reason: resp.error.unwrap_or_else(|| "auth.test failed".into()),
            });
        }
        Ok(resp.user.or(resp.user_id).unwrap_or_default())
    }

    /// Post `text` to a channel with link unfurling disabled.
    pub async fn post_message(&self, channel: &str, text: &str) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "channel": channel,
            "text": text,
            "unfurl_links": false,
            "unfurl_media": false,
        });

        let resp: ApiResponse = self
            .client
            .post(self.api_url("chat.postMessage"))
            .bearer_auth(self.config.bot_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| send_failed(e.to_string()))?
            .json()
            .await
            .map_err(|e| send_failed(e.to_string()))?;

        if !resp.ok {
            return Err(send_failed(
                resp.error.unwrap_or_else(|| "chat.postMessage failed".into()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for SlackTransport {
    fn name(&self) -> &str {
        "slack"
    }

    async fn send_notification(&self, text: &str) -> Result<(), ChannelError> {
        let Some(channel) = self.config.notify_channel.as_deref() else {
            return Ok(());
        };
        self.post_message(channel, text).await
    }
}

#[async_trait]
impl Transport for SlackTransport {
    fn platform(&self) -> Platform {
        Platform::Slack
    }

    fn is_admin(&self, user_id: &str) -> bool {
        self.config.admin_ids.iter().any(|id| id == user_id)
    }

    async fn start(&self, mut stop: StopSignal) -> Result<MessageStream, ChannelError> {
        let bot = self.auth_test().await?;
        tracing::info!(bot = %bot, channels = ?self.config.listen_channels, "Slack bot authenticated");

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let reader = HistoryReader {
            client: self.client.clone(),
            token: self.config.bot_token.clone(),
            url: self.api_url("conversations.history"),
        };
        let channels = self.config.listen_channels.clone();
        let interval = self.config.poll_interval;

        tokio::spawn(async move {
            // Only messages posted after startup are commands for us.
            let started = format!("{}.000000", Utc::now().timestamp());
            let mut cursors: HashMap<String, String> = channels
                .iter()
                .map(|c| (c.clone(), started.clone()))
                .collect();

            loop {
                for channel in &channels {
                    let oldest = cursors.get(channel).cloned().unwrap_or_else(|| started.clone());
                    let fetched = tokio::select! {
                        _ = wait_for_stop(&mut stop) => {
                            tracing::info!("Slack poller stopped");
                            return;
                        }
                        fetched = reader.since(channel, &oldest) => fetched,
                    };

                    let messages = match fetched {
                        Ok(messages) => messages,
                        Err(e) => {
                            tracing::warn!(channel = %channel, error = %e, "conversations.history failed");
                            continue;
                        }
                    };

                    if let Some(newest) = newest_ts(&messages) {
                        cursors.insert(channel.clone(), newest);
                    }
                    for incoming in command_messages(channel, messages) {
                        if tx.send(incoming).is_err() {
                            tracing::info!("Slack listener channel closed");
                            return;
                        }
                    }
                }

                tokio::select! {
                    _ = wait_for_stop(&mut stop) => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            tracing::info!("Slack poller stopped");
        });

        Ok(receiver_stream(rx))
    }

    async fn respond(&self, msg: &IncomingMessage, text: &str) -> Result<(), ChannelError> {
        self.post_message(&msg.chat_id, text).await
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        self.auth_test().await.map(|_| ())
    }
}

fn send_failed(reason: String) -> ChannelError {
    ChannelError::SendFailed {
        name: "slack".into(),
        reason,
    }
}

/// Slack timestamps are `seconds.micros` strings; compare numerically.
fn ts_value(ts: &str) -> f64 {
    ts.parse().unwrap_or(0.0)
}

fn newest_ts(messages: &[SlackMessage]) -> Option<String> {
    messages
        .iter()
        .max_by(|a, b| ts_value(&a.ts).total_cmp(&ts_value(&b.ts)))
        .map(|m| m.ts.clone())
}

/// Human, slash-prefixed messages in posting order.
///
/// Bot posts (our own replies included) and subtyped events such as joins
/// and edits are dropped.
fn command_messages(channel: &str, mut messages: Vec<SlackMessage>) -> Vec<IncomingMessage> {
    messages.sort_by(|a, b| ts_value(&a.ts).total_cmp(&ts_value(&b.ts)));
    messages
        .into_iter()
        .filter(|m| m.bot_id.is_none() && m.subtype.is_none())
        .filter(|m| m.text.trim_start().starts_with('/'))
        .filter_map(|m| {
            let user = m.user?;
            Some(
                IncomingMessage::new("slack", user, channel, m.text)
                    .with_metadata(serde_json::json!({ "ts": m.ts })),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::Router;
    use axum::extract::{Query, State};
    use axum::routing::get;
    use tokio::net::TcpListener;

    use super::*;

    fn transport(notify: Option<&str>) -> SlackTransport {
        SlackTransport::new(SlackConfig {
            bot_token: SecretString::from("xoxb-test"),
            admin_ids: vec!["U123".into(), "U456".into()],
            notify_channel: notify.map(String::from),
            listen_channels: vec!["C1".into()],
            poll_interval: Duration::from_secs(3),
        })
    }

    fn message(user: Option<&str>, text: &str, ts: &str) -> SlackMessage {
        SlackMessage {
            user: user.map(String::from),
            text: text.into(),
            ts: ts.into(),
            bot_id: None,
            subtype: None,
        }
    }

    #[test]
    fn slack_api_url() {
        let t = transport(None);
        assert_eq!(t.api_url("chat.postMessage"), "https://slack.com/api/chat.postMessage");
        assert_eq!(t.name(), "slack");
    }

    #[test]
    fn admin_ids_match_exactly() {
        let t = transport(None);
        assert!(t.is_admin("U123"));
        assert!(t.is_admin("U456"));
        assert!(!t.is_admin("u123"));
        assert!(!t.is_admin("U1234"));
        assert!(!t.is_admin(""));
    }

    #[tokio::test]
    async fn notification_without_channel_is_skipped() {
        transport(None).send_notification("🚨 alert").await.unwrap();
    }

    #[test]
    fn history_response_deserializes() {
        let raw = r#"{
            "ok": true,
            "messages": [
                {"type": "message", "user": "U123", "text": "/list", "ts": "1700000002.000200"},
                {"type": "message", "bot_id": "B1", "text": "📋 No suspended emails", "ts": "1700000003.000100"},
                {"type": "message", "subtype": "channel_join", "user": "U9", "text": "joined", "ts": "1700000001.000100"}
            ],
            "has_more": false
        }"#;
        let resp: HistoryResponse = serde_json::from_str(raw).unwrap();
        assert!(resp.ok);
        assert_eq!(resp.messages.len(), 3);
        assert_eq!(resp.messages[1].bot_id.as_deref(), Some("B1"));
    }

    #[test]
    fn command_messages_filters_and_orders() {
        let mut bot = message(None, "/status", "5.0");
        bot.bot_id = Some("B1".into());
        let mut edit = message(Some("U123"), "/list", "4.0");
        edit.subtype = Some("message_changed".into());

        // conversations.history returns newest first.
        let messages = vec![
            bot,
            edit,
            message(Some("U456"), "/whitelist list", "3.0"),
            message(Some("U123"), "good morning", "2.0"),
            message(Some("U123"), "/status", "1.0"),
        ];
        let commands = command_messages("C1", messages);
        let texts: Vec<&str> = commands.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["/status", "/whitelist list"]);
        assert_eq!(commands[0].user_id, "U123");
        assert_eq!(commands[0].chat_id, "C1");
        assert_eq!(commands[1].metadata["ts"], "3.0");
    }

    #[test]
    fn newest_ts_compares_numerically() {
        let messages = vec![
            message(Some("U1"), "/a", "1700000009.000900"),
            message(Some("U1"), "/b", "1700000010.000100"),
        ];
        assert_eq!(newest_ts(&messages).as_deref(), Some("1700000010.000100"));
        assert_eq!(newest_ts(&[]), None);
    }

    #[test]
    fn next_cursor_only_while_more() {
        let more: HistoryResponse = serde_json::from_str(
            r#"{"ok": true, "messages": [], "has_more": true, "response_metadata": {"next_cursor": "bmV4dA=="}}"#,
        )
        .unwrap();
        assert_eq!(more.next_cursor(), Some("bmV4dA=="));

        let done: HistoryResponse = serde_json::from_str(
            r#"{"ok": true, "messages": [], "has_more": false, "response_metadata": {"next_cursor": ""}}"#,
        )
        .unwrap();
        assert_eq!(done.next_cursor(), None);

        let blank: HistoryResponse =
            serde_json::from_str(r#"{"ok": true, "has_more": true}"#).unwrap();
        assert_eq!(blank.next_cursor(), None);
    }

    /// Serves `pages` history pages, newest first, three messages each.
    async fn history_server(pages: usize, calls: Arc<AtomicUsize>) -> String {
        async fn history(
            State((pages, calls)): State<(usize, Arc<AtomicUsize>)>,
            Query(query): Query<HashMap<String, String>>,
        ) -> axum::Json<serde_json::Value> {
            calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(query.get("oldest").map(String::as_str), Some("100.000000"));
            let page: usize = query
                .get("cursor")
                .and_then(|c| c.strip_prefix("page-"))
                .and_then(|n| n.parse().ok())
                .unwrap_or(0);
            let messages: Vec<_> = (0..3)
                .map(|i| {
                    let ts = 1000 - page * 3 - i;
                    serde_json::json!({"user": "U123", "text": format!("/m{ts}"), "ts": format!("{ts}.000000")})
                })
                .collect();
            let has_more = page + 1 < pages;
            let next_cursor = if has_more {
                format!("page-{}", page + 1)
            } else {
                String::new()
            };
            axum::Json(serde_json::json!({
                "ok": true,
                "messages": messages,
                "has_more": has_more,
                "response_metadata": {"next_cursor": next_cursor},
            }))
        }

        let router = Router::new()
            .route("/conversations.history", get(history))
            .with_state((pages, calls));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        format!("http://127.0.0.1:{port}/conversations.history")
    }

    fn reader(url: String) -> HistoryReader {
        HistoryReader {
            client: reqwest::Client::new(),
            token: SecretString::from("xoxb-test"),
            url,
        }
    }

    #[tokio::test]
    async fn busy_channel_is_read_across_pages() {
        let calls = Arc::new(AtomicUsize::new(0));
        let url = history_server(2, calls.clone()).await;

        let messages = reader(url).since("C1", "100.000000").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(messages.len(), 6);

        let commands = command_messages("C1", messages);
        assert_eq!(commands.first().map(|m| m.text.as_str()), Some("/m995"));
        assert_eq!(commands.last().map(|m| m.text.as_str()), Some("/m1000"));
    }

    #[tokio::test]
    async fn endless_backlog_stops_at_page_cap() {
        let calls = Arc::new(AtomicUsize::new(0));
        let url = history_server(MAX_HISTORY_PAGES + 5, calls.clone()).await;

        let messages = reader(url).since("C1", "100.000000").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), MAX_HISTORY_PAGES);
        assert_eq!(messages.len(), MAX_HISTORY_PAGES * 3);
        assert_eq!(newest_ts(&messages).as_deref(), Some("1000.000000"));
    }
}
