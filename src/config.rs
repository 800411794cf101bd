//! Configuration types.
//!
//! Values come from built-in defaults, then the first readable JSON config
//! file, then environment variables (highest precedence). File keys are the
//! lowercase form of the environment names, e.g. `whm_api_host`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::engine::RuntimeConfig;
use crate::error::ConfigError;

/// Config file name searched in the working directory and `$HOME`.
pub const CONFIG_FILE_NAME: &str = ".eximmon.conf";

/// System-wide config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/eximmon.conf";

/// Control-panel connection settings for the suspension client.
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Panel host name or address.
    pub host: String,
    /// WHM user the legacy proxy authenticates as.
    pub admin_user: String,
    /// API token used by both protocols.
    pub api_token: SecretString,
    /// Try the modern UAPI before the legacy proxy.
    pub prefer_modern: bool,
    /// cPanel port serving UAPI.
    pub modern_port: u16,
    /// WHM port serving the admin API.
    pub legacy_port: u16,
    /// Speak HTTPS to the panel. Certificates are never verified.
    pub use_tls: bool,
    pub modern_connect_timeout: Duration,
    pub legacy_connect_timeout: Duration,
    /// Whole-request deadline, applied to both protocols.
    pub request_timeout: Duration,
    /// Pause before a legacy suspend call.
    pub legacy_suspend_delay: Duration,
}

impl PanelConfig {
    pub fn new(host: impl Into<String>, admin_user: impl Into<String>, api_token: SecretString) -> Self {
        Self {
            host: host.into(),
            admin_user: admin_user.into(),
            api_token,
            prefer_modern: true,
            modern_port: 2083,
            legacy_port: 2087,
            use_tls: true,
            modern_connect_timeout: Duration::from_secs(30),
            legacy_connect_timeout: Duration::from_secs(300), // 5 minutes
            request_timeout: Duration::from_secs(300),
            legacy_suspend_delay: Duration::from_secs(1),
        }
    }

    /// Base URL (`scheme://host:port`) for the given port.
    pub fn base_url(&self, port: u16) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{scheme}://{}:{port}", self.host)
    }
}

/// Telegram transport settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub admin_ids: Vec<i64>,
    pub notify_chat_id: Option<i64>,
}

/// Slack transport settings.
#[derive(Debug, Clone)]
pub struct SlackConfig {
    pub bot_token: SecretString,
    pub admin_ids: Vec<String>,
    pub notify_channel: Option<String>,
    /// Channels polled for commands.
    pub listen_channels: Vec<String>,
    pub poll_interval: Duration,
}

/// SMTP notification settings.
#[derive(Debug, Clone)]
pub struct EmailNotifyConfig {
    pub to: String,
    pub from: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
}

/// Everything the binary needs to start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub panel: PanelConfig,
    pub runtime: RuntimeConfig,
    pub telegram: Option<TelegramConfig>,
    pub slack: Option<SlackConfig>,
    pub email: Option<EmailNotifyConfig>,
    pub log_dir: Option<PathBuf>,
    /// Run the local console transport.
    pub cli: bool,
}

/// Parsed JSON config file.
#[derive(Debug, Clone, Default)]
pub struct FileConfig {
    values: HashMap<String, serde_json::Value>,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let values: HashMap<String, serde_json::Value> = serde_json::from_str(text)?;
        Ok(Self { values })
    }

    /// Look up a key, rendering numbers and booleans as strings.
    fn get(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl AppConfig {
    /// Load from the first readable config file and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let file = find_config_file(&default_config_paths()).map(|(path, file)| {
            tracing::info!(path = %path.display(), "Loaded config file");
            file
        });
        Self::from_sources(file.as_ref(), |key| std::env::var(key).ok())
    }

    /// Build the config from an optional file and an environment lookup.
    pub fn from_sources(
        file: Option<&FileConfig>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |key: &str| -> Option<String> {
            env(key)
                .or_else(|| file.and_then(|f| f.get(&key.to_ascii_lowercase())))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_token = get("API_TOKEN").ok_or_else(|| ConfigError::MissingRequired {
            key: "API_TOKEN".into(),
            hint: "Create a WHM API token and export API_TOKEN=<token>".into(),
        })?;

        let mut panel = PanelConfig::new(
            get("WHM_API_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            get("WHM_API_USER").unwrap_or_else(|| "root".to_string()),
            SecretString::from(api_token),
        );
        if let Some(raw) = get("PREFER_MODERN_UAPI") {
            panel.prefer_modern = parse_bool("PREFER_MODERN_UAPI", &raw)?;
        }

        let defaults = RuntimeConfig::default();
        let runtime = RuntimeConfig {
            max_per_minute: match get("MAX_PER_MIN") {
                Some(raw) => parse_positive_i16("MAX_PER_MIN", &raw)?,
                None => defaults.max_per_minute,
            },
            max_per_hour: match get("MAX_PER_HOUR") {
                Some(raw) => parse_positive_i16("MAX_PER_HOUR", &raw)?,
                None => defaults.max_per_hour,
            },
        };

        let telegram = match get("TELEGRAM_BOT_TOKEN") {
            Some(token) => Some(TelegramConfig {
                bot_token: SecretString::from(token),
                admin_ids: parse_telegram_ids(get("TELEGRAM_ADMIN_IDS").as_deref()),
                notify_chat_id: match get("TELEGRAM_NOTIFY_CHAT_ID") {
                    Some(raw) => {
                        let id: i64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                            key: "TELEGRAM_NOTIFY_CHAT_ID".into(),
                            message: format!("expected a numeric chat id, got {raw:?}"),
                        })?;
                        (id != 0).then_some(id)
                    }
                    None => None,
                },
            }),
            None => None,
        };

        let slack = match get("SLACK_BOT_TOKEN") {
            Some(token) => {
                let notify_channel = get("SLACK_NOTIFY_CHANNEL");
                let mut listen_channels = parse_list(get("SLACK_LISTEN_CHANNELS").as_deref());
                if listen_channels.is_empty() {
                    listen_channels.extend(notify_channel.clone());
                }
                let poll_secs = match get("SLACK_POLL_INTERVAL_SECS") {
                    Some(raw) => raw.parse::<u64>().ok().filter(|s| *s > 0).ok_or_else(|| {
                        ConfigError::InvalidValue {
                            key: "SLACK_POLL_INTERVAL_SECS".into(),
                            message: format!("expected a positive number of seconds, got {raw:?}"),
                        }
                    })?,
                    None => 3,
                };
                Some(SlackConfig {
                    bot_token: SecretString::from(token),
                    admin_ids: parse_list(get("SLACK_ADMIN_IDS").as_deref()),
                    notify_channel,
                    listen_channels,
                    poll_interval: Duration::from_secs(poll_secs),
                })
            }
            None => None,
        };

        let email = match get("NOTIFY_EMAIL") {
            Some(to) => Some(EmailNotifyConfig {
                from: get("EMAIL_FROM_ADDRESS").unwrap_or_else(|| "eximmon@localhost".to_string()),
                smtp_host: get("EMAIL_SMTP_HOST").unwrap_or_else(|| "localhost".to_string()),
                smtp_port: match get("EMAIL_SMTP_PORT") {
                    Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                        key: "EMAIL_SMTP_PORT".into(),
                        message: format!("expected a port number, got {raw:?}"),
                    })?,
                    None => 25,
                },
                username: get("EMAIL_SMTP_USERNAME"),
                password: get("EMAIL_SMTP_PASSWORD").map(SecretString::from),
                to,
            }),
            None => None,
        };

        let cli = match get("EXIMMON_CLI") {
            Some(raw) => parse_bool("EXIMMON_CLI", &raw)?,
            None => false,
        };

        Ok(Self {
            panel,
            runtime,
            telegram,
            slack,
            email,
            log_dir: get("EXIMMON_LOG_DIR").map(PathBuf::from),
            cli,
        })
    }

    /// Whether at least one command transport is configured.
    pub fn has_transport(&self) -> bool {
        self.telegram.is_some() || self.slack.is_some() || self.cli
    }
}

/// Config file search order.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Ok(home) = std::env::var("HOME") {
        paths.push(Path::new(&home).join(CONFIG_FILE_NAME));
    }
    paths.push(PathBuf::from(SYSTEM_CONFIG_PATH));
    paths
}

/// Return the first path that can be read and parsed.
///
/// Unreadable paths are skipped silently; unparsable ones with a warning.
pub fn find_config_file(paths: &[PathBuf]) -> Option<(PathBuf, FileConfig)> {
    for path in paths {
        let Ok(text) = std::fs::read_to_string(path) else {
            continue;
        };
        match FileConfig::parse(&text) {
            Ok(file) => return Some((path.clone(), file)),
            Err(e) => {
                let err = ConfigError::ParseError {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                };
                tracing::warn!("{err}");
            }
        }
    }
    None
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.into(),
            message: format!("expected a boolean, got {raw:?}"),
        }),
    }
}

fn parse_positive_i16(key: &str, raw: &str) -> Result<i16, ConfigError> {
    match raw.parse::<i16>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(ConfigError::InvalidValue {
            key: key.into(),
            message: format!("expected a positive 16-bit integer, got {raw:?}"),
        }),
    }
}

fn parse_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(|s| s.chars().filter(|c| !c.is_whitespace()).collect::<String>())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_telegram_ids(raw: Option<&str>) -> Vec<i64> {
    parse_list(raw)
        .into_iter()
        .filter_map(|id| match id.parse::<i64>() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!(id = %id, "Ignoring non-numeric Telegram admin id");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_with_only_token() {
        let cfg = AppConfig::from_sources(None, env_from(&[("API_TOKEN", "tok")])).unwrap();
        assert_eq!(cfg.panel.host, "127.0.0.1");
        assert_eq!(cfg.panel.admin_user, "root");
        assert_eq!(cfg.panel.api_token.expose_secret(), "tok");
        assert!(cfg.panel.prefer_modern);
        assert_eq!(cfg.panel.modern_port, 2083);
        assert_eq!(cfg.panel.legacy_port, 2087);
        assert_eq!(cfg.panel.modern_connect_timeout, Duration::from_secs(30));
        assert_eq!(cfg.panel.legacy_connect_timeout, Duration::from_secs(300));
        assert_eq!(cfg.panel.legacy_suspend_delay, Duration::from_secs(1));
        assert_eq!(cfg.runtime, RuntimeConfig::default());
        assert!(cfg.telegram.is_none());
        assert!(cfg.slack.is_none());
        assert!(cfg.email.is_none());
        assert!(!cfg.has_transport());
    }

    #[test]
    fn missing_token_is_an_error() {
        let err = AppConfig::from_sources(None, env_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "API_TOKEN"));
    }

    #[test]
    fn env_overrides_file() {
        let file = FileConfig::parse(
            r#"{"api_token":"file-tok","whm_api_host":"panel.example.com","max_per_min":20,"prefer_modern_uapi":"false"}"#,
        )
        .unwrap();
        let cfg = AppConfig::from_sources(
            Some(&file),
            env_from(&[("WHM_API_HOST", "10.0.0.5"), ("MAX_PER_HOUR", "250")]),
        )
        .unwrap();
        assert_eq!(cfg.panel.api_token.expose_secret(), "file-tok");
        assert_eq!(cfg.panel.host, "10.0.0.5");
        assert!(!cfg.panel.prefer_modern);
        assert_eq!(cfg.runtime.max_per_minute, 20);
        assert_eq!(cfg.runtime.max_per_hour, 250);
    }

    #[test]
    fn empty_env_value_falls_through_to_file() {
        let file = FileConfig::parse(r#"{"api_token":"file-tok"}"#).unwrap();
        let cfg = AppConfig::from_sources(Some(&file), env_from(&[("API_TOKEN", "  ")])).unwrap();
        assert_eq!(cfg.panel.api_token.expose_secret(), "file-tok");
    }

    #[test]
    fn non_positive_limits_rejected() {
        let err = AppConfig::from_sources(
            None,
            env_from(&[("API_TOKEN", "t"), ("MAX_PER_MIN", "0")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "MAX_PER_MIN"));

        let err = AppConfig::from_sources(
            None,
            env_from(&[("API_TOKEN", "t"), ("MAX_PER_HOUR", "40000")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "MAX_PER_HOUR"));
    }

    #[test]
    fn bad_boolean_rejected() {
        let err = AppConfig::from_sources(
            None,
            env_from(&[("API_TOKEN", "t"), ("PREFER_MODERN_UAPI", "maybe")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("PREFER_MODERN_UAPI"));
    }

    #[test]
    fn telegram_section() {
        let cfg = AppConfig::from_sources(
            None,
            env_from(&[
                ("API_TOKEN", "t"),
                ("TELEGRAM_BOT_TOKEN", "123:ABC"),
                ("TELEGRAM_ADMIN_IDS", "111, 222,abc,,333"),
                ("TELEGRAM_NOTIFY_CHAT_ID", "-100200300"),
            ]),
        )
        .unwrap();
        let tg = cfg.telegram.as_ref().unwrap();
        assert_eq!(tg.admin_ids, vec![111, 222, 333]);
        assert_eq!(tg.notify_chat_id, Some(-100200300));
        assert!(cfg.has_transport());
    }

    #[test]
    fn telegram_zero_chat_id_means_no_destination() {
        let cfg = AppConfig::from_sources(
            None,
            env_from(&[
                ("API_TOKEN", "t"),
                ("TELEGRAM_BOT_TOKEN", "123:ABC"),
                ("TELEGRAM_NOTIFY_CHAT_ID", "0"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.telegram.unwrap().notify_chat_id, None);
    }

    #[test]
    fn slack_section_defaults_listen_to_notify_channel() {
        let cfg = AppConfig::from_sources(
            None,
            env_from(&[
                ("API_TOKEN", "t"),
                ("SLACK_BOT_TOKEN", "xoxb-1"),
                ("SLACK_ADMIN_IDS", "U01, U02 ,"),
                ("SLACK_NOTIFY_CHANNEL", "C123"),
            ]),
        )
        .unwrap();
        let slack = cfg.slack.unwrap();
        assert_eq!(slack.admin_ids, vec!["U01", "U02"]);
        assert_eq!(slack.notify_channel.as_deref(), Some("C123"));
        assert_eq!(slack.listen_channels, vec!["C123"]);
        assert_eq!(slack.poll_interval, Duration::from_secs(3));
    }

    #[test]
    fn email_section() {
        let cfg = AppConfig::from_sources(
            None,
            env_from(&[
                ("API_TOKEN", "t"),
                ("NOTIFY_EMAIL", "ops@example.com"),
                ("EMAIL_SMTP_PORT", "587"),
                ("EMAIL_SMTP_USERNAME", "relay"),
                ("EMAIL_SMTP_PASSWORD", "pw"),
            ]),
        )
        .unwrap();
        let email = cfg.email.unwrap();
        assert_eq!(email.to, "ops@example.com");
        assert_eq!(email.smtp_host, "localhost");
        assert_eq!(email.smtp_port, 587);
        assert_eq!(email.username.as_deref(), Some("relay"));
        assert_eq!(email.password.unwrap().expose_secret(), "pw");
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let cfg = AppConfig::from_sources(
            None,
            env_from(&[("API_TOKEN", "super-secret-token")]),
        )
        .unwrap();
        assert!(!format!("{cfg:?}").contains("super-secret-token"));
    }

    #[test]
    fn find_config_file_skips_missing_and_broken() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.conf");
        let good = dir.path().join("good.conf");
        std::fs::write(&broken, "{not json").unwrap();
        std::fs::write(&good, r#"{"api_token":"from-file"}"#).unwrap();

        let paths = vec![dir.path().join("missing.conf"), broken, good.clone()];
        let (path, file) = find_config_file(&paths).unwrap();
        assert_eq!(path, good);
        assert_eq!(file.get("api_token").as_deref(), Some("from-file"));
    }

    #[test]
    fn base_url_scheme_follows_tls_flag() {
        let mut panel = PanelConfig::new("host", "root", SecretString::from("t"));
        assert_eq!(panel.base_url(2087), "https://host:2087");
        panel.use_tls = false;
        assert_eq!(panel.base_url(2083), "http://host:2083");
    }
}
