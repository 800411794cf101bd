//! Chat transports and notifiers.

pub mod channel;
pub mod cli;
pub mod email;
pub mod manager;
pub mod slack;
pub mod telegram;

pub use channel::*;
pub use cli::CliTransport;
pub use email::EmailNotifier;
pub use manager::{TransportManager, handle_message};
pub use slack::SlackTransport;
pub use telegram::TelegramTransport;
