//! Chat commands: the closed set of command kinds, the parsed command value
//! and the text grammar transports use to build it.

use std::fmt;

/// Every command the dispatcher understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Status,
    Suspend,
    Unsuspend,
    List,
    Stats,
    Config,
    Set,
    WhitelistAdd,
    WhitelistRemove,
    WhitelistList,
    Unknown,
}

impl CommandKind {
    pub const ALL: [CommandKind; 11] = [
        Self::Status,
        Self::Suspend,
        Self::Unsuspend,
        Self::List,
        Self::Stats,
        Self::Config,
        Self::Set,
        Self::WhitelistAdd,
        Self::WhitelistRemove,
        Self::WhitelistList,
        Self::Unknown,
    ];

    /// Admin gate policy, shared by every transport.
    ///
    /// Read-only commands are public; anything that mutates state (and
    /// anything unrecognized) needs the caller on the platform's admin list.
    pub fn requires_admin(self) -> bool {
        !matches!(
            self,
            Self::Status | Self::List | Self::Stats | Self::Config | Self::WhitelistList
        )
    }

    /// Number of arguments the dispatcher reads.
    pub fn arity(self) -> usize {
        match self {
            Self::Suspend | Self::Unsuspend | Self::Stats => 1,
            Self::WhitelistAdd | Self::WhitelistRemove => 1,
            Self::Set => 2,
            Self::Status | Self::List | Self::Config | Self::WhitelistList | Self::Unknown => 0,
        }
    }

    pub fn usage(self) -> &'static str {
        match self {
            Self::Status => "/status",
            Self::Suspend => "/suspend <email>",
            Self::Unsuspend => "/unsuspend <email>",
            Self::List => "/list",
            Self::Stats => "/stats <email>",
            Self::Config => "/config",
            Self::Set => "/set <max_per_min|max_per_hour> <value>",
            Self::WhitelistAdd => "/whitelist add <email>",
            Self::WhitelistRemove => "/whitelist remove <email>",
            Self::WhitelistList => "/whitelist list",
            Self::Unknown => "/status, /list, /suspend, /unsuspend, /config, /whitelist",
        }
    }
}

/// Chat platform a command arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Telegram,
    Slack,
    Cli,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Telegram => write!(f, "telegram"),
            Self::Slack => write!(f, "slack"),
            Self::Cli => write!(f, "cli"),
        }
    }
}

/// A parsed command, consumed once by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub args: Vec<String>,
    pub platform: Platform,
    pub user_id: String,
    pub chat_id: String,
}

impl Command {
    pub fn new(
        kind: CommandKind,
        args: Vec<String>,
        platform: Platform,
        user_id: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            args,
            platform,
            user_id: user_id.into(),
            chat_id: chat_id.into(),
        }
    }

    /// Bounds-checked argument access.
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

/// Parse chat text into a command kind and its arguments.
///
/// Returns `None` for ordinary chat (no leading `/`). Unrecognized verbs and
/// commands with missing arguments come back as [`CommandKind::Unknown`].
pub fn parse_command(text: &str) -> Option<(CommandKind, Vec<String>)> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }

    let mut parts = text.split_whitespace();
    let verb = parts.next()?;
    // Telegram group syntax: /status@my_bot
    let verb = verb.split('@').next().unwrap_or(verb).to_ascii_lowercase();
    let args: Vec<String> = parts.map(str::to_string).collect();

    let kind = match verb.as_str() {
        "/status" => CommandKind::Status,
        "/suspend" if !args.is_empty() => CommandKind::Suspend,
        "/unsuspend" if !args.is_empty() => CommandKind::Unsuspend,
        "/list" => CommandKind::List,
        "/stats" if !args.is_empty() => CommandKind::Stats,
        "/config" => CommandKind::Config,
        "/set" if args.len() >= 2 => CommandKind::Set,
        "/whitelist" => {
            return Some(match (args.first().map(String::as_str), args.len()) {
                (Some("add"), n) if n >= 2 => (CommandKind::WhitelistAdd, args[1..].to_vec()),
                (Some("remove"), n) if n >= 2 => {
                    (CommandKind::WhitelistRemove, args[1..].to_vec())
                }
                (Some("list"), 1) => (CommandKind::WhitelistList, args),
                _ => (CommandKind::Unknown, args),
            });
        }
        _ => CommandKind::Unknown,
    };
    Some((kind, args))
}
