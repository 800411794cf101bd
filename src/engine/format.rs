//! Chat message rendering. Everything here is pure.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::time::Duration;

use super::command::CommandKind;
use super::state::{RuntimeConfig, SuspensionRecord};

pub const NO_SUSPENDED_EMAILS: &str = "📋 No suspended emails";
pub const WHITELIST_EMPTY: &str = "📋 Whitelist is empty";
pub const ACCESS_DENIED: &str = "⛔ Access denied. You are not an admin.";

/// Alert sent when an address is suspended.
pub fn suspension_alert(record: &SuspensionRecord) -> String {
    format!(
        "🚨 *SPAM DETECTED*\n\n\
         📧 Email: `{email}`\n\
         🌐 Domain: `{domain}`\n\
         📊 Rate: {per_min} emails/min\n\
         📈 Total: {per_hour} emails/hour\n\n\
         ✅ Action: *SUSPENDED*\n\n\
         Reply `/unsuspend {email}` to restore",
        email = record.email,
        domain = record.domain,
        per_min = record.rate_per_minute,
        per_hour = record.rate_per_hour,
    )
}

/// Alert sent when an address is unsuspended.
pub fn unsuspend_alert(email: &str) -> String {
    format!("✅ Email unsuspended: `{email}`")
}

pub fn status(uptime: Duration, suspended: usize, whitelisted: usize) -> String {
    format!(
        "📊 *Eximmon Status*\n\n\
         ⏱ Uptime: {}\n\
         🚫 Suspended: {suspended} emails\n\
         ✅ Whitelisted: {whitelisted} emails",
        uptime_text(uptime)
    )
}

/// `1d 2h 3m 4s`, dropping leading zero units.
pub fn uptime_text(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (days, hours, minutes, seconds) = (
        secs / 86_400,
        (secs % 86_400) / 3600,
        (secs % 3600) / 60,
        secs % 60,
    );
    let mut out = String::new();
    for (value, unit) in [(days, "d"), (hours, "h"), (minutes, "m")] {
        if value > 0 || !out.is_empty() {
            let _ = write!(out, "{value}{unit} ");
        }
    }
    let _ = write!(out, "{seconds}s");
    out
}

pub fn suspended_list(records: &BTreeMap<String, SuspensionRecord>) -> String {
    if records.is_empty() {
        return NO_SUSPENDED_EMAILS.to_string();
    }
    let mut out = String::from("📋 *Suspended Emails:*\n\n");
    for (email, record) in records {
        let _ = writeln!(
            out,
            "• `{email}` - {}",
            record.suspended_at.format("%Y-%m-%d %H:%M")
        );
    }
    out
}

pub fn whitelist(entries: &BTreeSet<String>) -> String {
    if entries.is_empty() {
        return WHITELIST_EMPTY.to_string();
    }
    let mut out = String::from("📋 *Whitelisted Emails:*\n\n");
    for email in entries {
        let _ = writeln!(out, "• `{email}`");
    }
    out
}

pub fn config(runtime: &RuntimeConfig) -> String {
    format!(
        "⚙️ *Configuration:*\n• Max Per Min: {}\n• Max Per Hour: {}",
        runtime.max_per_minute, runtime.max_per_hour
    )
}

pub fn unknown_command() -> String {
    format!("❓ Unknown command. Try {}", CommandKind::Unknown.usage())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record() -> SuspensionRecord {
        SuspensionRecord {
            email: "spam@example.com".into(),
            domain: "example.com".into(),
            suspended_at: chrono::Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap(),
            reason: "rate exceeded".into(),
            rate_per_minute: 42,
            rate_per_hour: 900,
        }
    }

    #[test]
    fn suspension_alert_contents() {
        let text = suspension_alert(&record());
        assert!(text.contains("📧 Email: `spam@example.com`"));
        assert!(text.contains("🌐 Domain: `example.com`"));
        assert!(text.contains("42 emails/min"));
        assert!(text.contains("900 emails/hour"));
        assert!(text.ends_with("Reply `/unsuspend spam@example.com` to restore"));
    }

    #[test]
    fn unsuspend_alert_is_one_line() {
        let text = unsuspend_alert("spam@example.com");
        assert_eq!(text, "✅ Email unsuspended: `spam@example.com`");
    }

    #[test]
    fn uptime_formatting() {
        assert_eq!(uptime_text(Duration::from_secs(5)), "5s");
        assert_eq!(uptime_text(Duration::from_secs(65)), "1m 5s");
        assert_eq!(uptime_text(Duration::from_secs(3600)), "1h 0m 0s");
        assert_eq!(uptime_text(Duration::from_secs(90_061)), "1d 1h 1m 1s");
    }

    #[test]
    fn status_counts() {
        let text = status(Duration::from_secs(61), 3, 1);
        assert!(text.contains("Uptime: 1m 1s"));
        assert!(text.contains("Suspended: 3 emails"));
        assert!(text.contains("Whitelisted: 1 emails"));
    }

    #[test]
    fn list_renders_timestamp() {
        let mut records = BTreeMap::new();
        records.insert("spam@example.com".to_string(), record());
        let text = suspended_list(&records);
        assert!(text.contains("• `spam@example.com` - 2024-03-09 14:05"));
    }

    #[test]
    fn empty_sentinels() {
        assert_eq!(suspended_list(&BTreeMap::new()), "📋 No suspended emails");
        assert_eq!(whitelist(&BTreeSet::new()), "📋 Whitelist is empty");
    }

    #[test]
    fn config_rendering() {
        let text = config(&RuntimeConfig {
            max_per_minute: 12,
            max_per_hour: 100,
        });
        assert!(text.contains("Max Per Min: 12"));
        assert!(text.contains("Max Per Hour: 100"));
    }
}
