//! Shared suspension state.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

/// Reason recorded for suspensions issued from chat.
pub const MANUAL_SUSPENSION_REASON: &str = "Manual suspension via bot";

/// One address the engine believes is suspended on the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspensionRecord {
    pub email: String,
    pub domain: String,
    pub suspended_at: DateTime<Utc>,
    pub reason: String,
    pub rate_per_minute: u32,
    pub rate_per_hour: u32,
}

impl SuspensionRecord {
    /// Record for a suspension issued by an operator command.
    pub fn manual(email: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            domain: domain.into(),
            suspended_at: Utc::now(),
            reason: MANUAL_SUSPENSION_REASON.to_string(),
            rate_per_minute: 0,
            rate_per_hour: 0,
        }
    }
}

/// Sending limits adjustable at runtime with `/set`.
///
/// The engine only stores these; enforcement belongs to the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub max_per_minute: i16,
    pub max_per_hour: i16,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_per_minute: 8,
            max_per_hour: 100,
        }
    }
}

/// Everything the dispatcher mutates. Lives behind the engine's lock.
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub suspended: BTreeMap<String, SuspensionRecord>,
    pub whitelist: BTreeSet<String>,
    pub runtime: RuntimeConfig,
}

impl EngineState {
    pub fn new(runtime: RuntimeConfig) -> Self {
        Self {
            runtime,
            ..Default::default()
        }
    }
}
