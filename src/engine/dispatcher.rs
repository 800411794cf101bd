//! Command dispatch: the single serialization point for state changes.

use tracing::{debug, info, warn};

use super::command::{Command, CommandKind};
use super::format;
use super::state::{EngineState, SuspensionRecord};
use super::Engine;
use crate::address::domain_of;
use crate::error::ValidationError;

impl Engine {
    /// Handle one command and return the reply text.
    ///
    /// Holds the state's write lock until the reply is rendered, including
    /// while the panel call is in flight.
    pub async fn dispatch(&self, cmd: &Command) -> String {
        let mut state = self.state.write().await;
        debug!(
            kind = ?cmd.kind,
            platform = %cmd.platform,
            user = %cmd.user_id,
            chat = %cmd.chat_id,
            "Dispatching command"
        );

        // No wildcard arm: a new CommandKind must get a handler here.
        match cmd.kind {
            CommandKind::Status => format::status(
                self.started.elapsed(),
                state.suspended.len(),
                state.whitelist.len(),
            ),
            CommandKind::Suspend => self.suspend(&mut state, cmd).await,
            CommandKind::Unsuspend => self.unsuspend(&mut state, cmd).await,
            CommandKind::List => format::suspended_list(&state.suspended),
            CommandKind::Stats => match required_arg(cmd, 0) {
                Ok(email) => format!("📊 Stats for `{email}` - Feature coming soon"),
                Err(e) => reject(e),
            },
            CommandKind::Config => format::config(&state.runtime),
            CommandKind::Set => set(&mut state, cmd),
            CommandKind::WhitelistAdd => whitelist_add(&mut state, cmd),
            CommandKind::WhitelistRemove => whitelist_remove(&mut state, cmd),
            CommandKind::WhitelistList => format::whitelist(&state.whitelist),
            CommandKind::Unknown => format::unknown_command(),
        }
    }

    async fn suspend(&self, state: &mut EngineState, cmd: &Command) -> String {
        let email = match required_arg(cmd, 0) {
            Ok(email) => email,
            Err(e) => return reject(e),
        };
        let domain = match domain_of(email) {
            Ok(domain) => domain,
            Err(e) => return reject(e),
        };

        match self.suspender.set_outgoing_suspended(email, true).await {
            Ok(()) => {
                state
                    .suspended
                    .insert(email.to_string(), SuspensionRecord::manual(email, domain));
                info!(email, user = %cmd.user_id, platform = %cmd.platform, "Suspended via command");
                format!("✅ Suspended: `{email}`")
            }
            Err(e) => {
                warn!(email, kind = e.kind(), error = %e, "Suspend command failed");
                format!("❌ Failed to suspend {email}: {e}")
            }
        }
    }

    async fn unsuspend(&self, state: &mut EngineState, cmd: &Command) -> String {
        let email = match required_arg(cmd, 0) {
            Ok(email) => email,
            Err(e) => return reject(e),
        };
        if let Err(e) = domain_of(email) {
            return reject(e);
        }

        match self.suspender.set_outgoing_suspended(email, false).await {
            Ok(()) => {
                state.suspended.remove(email);
                info!(email, user = %cmd.user_id, platform = %cmd.platform, "Unsuspended via command");
                format!("✅ Unsuspended: `{email}`")
            }
            Err(e) => {
                warn!(email, kind = e.kind(), error = %e, "Unsuspend command failed");
                format!("❌ Failed to unsuspend {email}: {e}")
            }
        }
    }
}

fn set(state: &mut EngineState, cmd: &Command) -> String {
    let (Ok(key), Ok(raw)) = (required_arg(cmd, 0), required_arg(cmd, 1)) else {
        return reject(missing(cmd.kind));
    };
    let value = match raw.parse::<i16>() {
        Ok(v) if v > 0 => v,
        _ => {
            return reject(ValidationError::InvalidValue {
                key: key.to_string(),
                value: raw.to_string(),
            });
        }
    };

    match key.to_ascii_lowercase().as_str() {
        "max_per_min" => {
            state.runtime.max_per_minute = value;
            info!(value, "max_per_min updated");
            format!("✅ Set max_per_min to {value}")
        }
        "max_per_hour" => {
            state.runtime.max_per_hour = value;
            info!(value, "max_per_hour updated");
            format!("✅ Set max_per_hour to {value}")
        }
        _ => reject(ValidationError::UnknownKey(key.to_string())),
    }
}

fn whitelist_add(state: &mut EngineState, cmd: &Command) -> String {
    let email = match required_arg(cmd, 0) {
        Ok(email) => email,
        Err(e) => return reject(e),
    };
    if let Err(e) = domain_of(email) {
        return reject(e);
    }
    state.whitelist.insert(email.to_string());
    format!("✅ Added to whitelist: `{email}`")
}

fn whitelist_remove(state: &mut EngineState, cmd: &Command) -> String {
    match required_arg(cmd, 0) {
        Ok(email) => {
            state.whitelist.remove(email);
            format!("✅ Removed from whitelist: `{email}`")
        }
        Err(e) => reject(e),
    }
}

fn required_arg(cmd: &Command, index: usize) -> Result<&str, ValidationError> {
    cmd.arg(index).ok_or_else(|| missing(cmd.kind))
}

fn missing(kind: CommandKind) -> ValidationError {
    ValidationError::MissingArgument {
        usage: kind.usage().to_string(),
    }
}

fn reject(err: ValidationError) -> String {
    debug!(error = %err, "Rejected command input");
    format!("❌ {err}")
}
