//! eximmon: chat-driven remediation of spam-sending mail accounts.
//!
//! Operators suspend and unsuspend outgoing mail from Telegram, Slack or a
//! local console; the engine applies the change through the hosting control
//! panel and keeps a shared view of what is currently suspended.

pub mod address;
pub mod channels;
pub mod config;
pub mod engine;
pub mod error;
pub mod panel;
