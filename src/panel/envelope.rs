//! Control-panel response envelopes.
//!
//! The panel answers in three incompatible JSON shapes depending on which API
//! generation served the request. Each shape implements [`Envelope`], and
//! [`decode`] turns raw bytes into a single [`PanelOutcome`] so callers never
//! look at provider-specific fields.

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{PanelError, PanelProtocol};

/// Normalized result of one panel call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelOutcome {
    pub success: bool,
    /// Panel-provided error text; empty on success.
    pub message: String,
}

impl PanelOutcome {
    /// Convert into a `Result`, mapping failure to `PanelRejected`.
    pub fn into_result(self, protocol: PanelProtocol) -> Result<(), PanelError> {
        if self.success {
            Ok(())
        } else {
            Err(PanelError::PanelRejected {
                protocol,
                message: self.message,
            })
        }
    }
}

/// Capability set shared by every envelope shape.
pub trait Envelope: DeserializeOwned {
    const PROTOCOL: PanelProtocol;

    /// Whether the envelope reports success.
    fn status_ok(&self) -> bool;

    /// Human-readable error text extracted from the envelope.
    fn error_message(&self) -> String;

    /// Raw status code, used when the panel gives no message.
    fn status_code(&self) -> i64;
}

/// Decode `body` as envelope `E` and normalize it.
pub fn decode<E: Envelope>(body: &[u8]) -> Result<PanelOutcome, PanelError> {
    let envelope: E = serde_json::from_slice(body).map_err(|e| PanelError::DecodeFailed {
        protocol: E::PROTOCOL,
        reason: format!("{e} (body: {})", preview(body)),
    })?;
    Ok(normalize(&envelope))
}

fn normalize<E: Envelope>(envelope: &E) -> PanelOutcome {
    if envelope.status_ok() {
        return PanelOutcome {
            success: true,
            message: String::new(),
        };
    }
    let mut message = envelope.error_message();
    if message.is_empty() {
        message = format!("unknown error (status {})", envelope.status_code());
    }
    PanelOutcome {
        success: false,
        message,
    }
}

/// Decode a modern UAPI response.
pub fn decode_uapi(body: &[u8]) -> Result<PanelOutcome, PanelError> {
    decode::<UapiEnvelope>(body)
}

/// Decode a cPanel API v3 response proxied through WHM.
pub fn decode_legacy_proxy(body: &[u8]) -> Result<PanelOutcome, PanelError> {
    decode::<LegacyProxyEnvelope>(body)
}

/// Decode a WHM API 1 response.
pub fn decode_whm_api1(body: &[u8]) -> Result<PanelOutcome, PanelError> {
    decode::<WhmApi1Envelope>(body)
}

fn join_messages(list: &Option<Vec<String>>) -> String {
    list.as_deref()
        .map(|items| {
            items
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

fn preview(body: &[u8]) -> String {
    const MAX: usize = 200;
    let text = String::from_utf8_lossy(body);
    if text.chars().count() <= MAX {
        text.into_owned()
    } else {
        let cut: String = text.chars().take(MAX).collect();
        format!("{cut}...")
    }
}

// ── Modern UAPI ─────────────────────────────────────────────────────

/// `GET /execute/<Module>/<function>` response.
#[derive(Debug, Clone, Deserialize)]
pub struct UapiEnvelope {
    pub status: i64,
    #[serde(default)]
    pub statusmsg: Option<String>,
    #[serde(default)]
    pub errors: Option<Vec<String>>,
    #[serde(default)]
    pub messages: Option<Vec<String>>,
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Envelope for UapiEnvelope {
    const PROTOCOL: PanelProtocol = PanelProtocol::ModernUapi;

    fn status_ok(&self) -> bool {
        self.status == 1
    }

    fn error_message(&self) -> String {
        let joined = join_messages(&self.errors);
        if !joined.is_empty() {
            return joined;
        }
        self.statusmsg.clone().unwrap_or_default()
    }

    fn status_code(&self) -> i64 {
        self.status
    }
}

// ── Legacy proxy (cPanel API v3 via WHM) ────────────────────────────

/// `GET /json-api/cpanel?...` response.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyProxyEnvelope {
    #[serde(default)]
    pub func: Option<String>,
    pub result: LegacyProxyResult,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyProxyResult {
    pub status: i64,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub errors: Option<Vec<String>>,
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
    #[serde(default)]
    pub messages: Option<Vec<String>>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Envelope for LegacyProxyEnvelope {
    const PROTOCOL: PanelProtocol = PanelProtocol::LegacyProxy;

    fn status_ok(&self) -> bool {
        self.result.status == 1
    }

    fn error_message(&self) -> String {
        join_messages(&self.result.errors)
    }

    fn status_code(&self) -> i64 {
        self.result.status
    }
}

// ── WHM API 1 ───────────────────────────────────────────────────────

/// Native WHM API 1 response (`metadata` + `data`).
#[derive(Debug, Clone, Deserialize)]
pub struct WhmApi1Envelope {
    pub metadata: WhmMetadata,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhmMetadata {
    pub result: i64,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub version: Option<i64>,
}

impl WhmApi1Envelope {
    /// Account owner reported by `domainuserdata`.
    pub fn userdata_user(&self) -> Option<&str> {
        self.data
            .get("userdata")
            .and_then(|u| u.get("user"))
            .and_then(serde_json::Value::as_str)
            .filter(|u| !u.is_empty())
    }
}

impl Envelope for WhmApi1Envelope {
    const PROTOCOL: PanelProtocol = PanelProtocol::WhmApi1;

    fn status_ok(&self) -> bool {
        self.metadata.result == 1
    }

    fn error_message(&self) -> String {
        self.metadata.reason.clone().unwrap_or_default()
    }

    fn status_code(&self) -> i64 {
        self.metadata.result
    }
}
