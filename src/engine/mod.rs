//! Suspension engine: shared state, command dispatch and notification
//! fan-out.
//!
//! [`Engine`] owns the only copy of [`EngineState`]. Every command runs under
//! the state's write lock for its whole duration, panel call included, so
//! no two commands interleave their effects.

pub mod command;
pub mod dispatcher;
pub mod format;
pub mod notify;
pub mod state;

pub use command::{Command, CommandKind, Platform, parse_command};
pub use notify::Notifier;
pub use state::{EngineState, MANUAL_SUSPENSION_REASON, RuntimeConfig, SuspensionRecord};

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;

use crate::panel::OutgoingSuspender;

/// The suspension engine shared by every transport.
pub struct Engine {
    state: RwLock<EngineState>,
    suspender: Arc<dyn OutgoingSuspender>,
    notifiers: Vec<Arc<dyn Notifier>>,
    started: Instant,
}

impl Engine {
    pub fn new(runtime: RuntimeConfig, suspender: Arc<dyn OutgoingSuspender>) -> Self {
        Self {
            state: RwLock::new(EngineState::new(runtime)),
            suspender,
            notifiers: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Destinations for suspension alerts.
    pub fn with_notifiers(mut self, notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        self.notifiers = notifiers;
        self
    }

    pub fn notifier_names(&self) -> Vec<&str> {
        self.notifiers.iter().map(|n| n.name()).collect()
    }

    pub async fn is_whitelisted(&self, email: &str) -> bool {
        self.state.read().await.whitelist.contains(email)
    }

    pub async fn runtime_config(&self) -> RuntimeConfig {
        self.state.read().await.runtime
    }

    pub async fn suspended_emails(&self) -> Vec<String> {
        self.state.read().await.suspended.keys().cloned().collect()
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> EngineState {
        self.state.read().await.clone()
    }
}
