//! Error types for eximmon.

use std::fmt;

/// Error from recording and announcing an automatic action.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration file {path}: {reason}")]
    ParseError { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which control-panel API generation a request went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelProtocol {
    /// Direct per-account UAPI on the cPanel port.
    ModernUapi,
    /// cPanel API v3 proxied through the WHM admin API.
    LegacyProxy,
    /// Native WHM API 1 calls (account lookup, account-level suspension).
    WhmApi1,
}

impl fmt::Display for PanelProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModernUapi => write!(f, "modern UAPI"),
            Self::LegacyProxy => write!(f, "legacy WHM proxy"),
            Self::WhmApi1 => write!(f, "WHM API 1"),
        }
    }
}

/// Control-panel errors surfaced by the suspension client.
#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    #[error("account lookup failed for domain {domain}: {reason}")]
    AccountLookupFailed { domain: String, reason: String },

    #[error("{protocol} transport failed: {reason}")]
    TransportFailed {
        protocol: PanelProtocol,
        reason: String,
    },

    #[error("{protocol} returned a malformed response: {reason}")]
    DecodeFailed {
        protocol: PanelProtocol,
        reason: String,
    },

    #[error("{protocol} rejected the request: {message}")]
    PanelRejected {
        protocol: PanelProtocol,
        message: String,
    },
}

impl PanelError {
    /// Short, stable label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidEmail(_) => "invalid_email",
            Self::AccountLookupFailed { .. } => "account_lookup_failed",
            Self::TransportFailed { .. } => "transport_failed",
            Self::DecodeFailed { .. } => "decode_failed",
            Self::PanelRejected { .. } => "panel_rejected",
        }
    }
}

/// Bad user input; answered inline, never changes state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Unknown config key: {0}")]
    UnknownKey(String),

    #[error("Missing argument. Usage: {usage}")]
    MissingArgument { usage: String },
}

/// Transport-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send message on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Authentication failed for channel {name}: {reason}")]
    AuthFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}
