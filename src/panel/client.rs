//! Outgoing-mail suspension through the control panel.
//!
//! The panel exposes two API generations for the same operation. A call runs
//! an ordered plan of [`Attempt`]s: the modern UAPI first (when preferred),
//! then the legacy WHM proxy. A modern failure is recoverable and falls
//! through; the legacy attempt is final and its error is what callers see.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::AUTHORIZATION;
use secrecy::ExposeSecret;
use tracing::{debug, error, info, warn};

use super::account::{AccountIdentity, AccountResolver, WhmAccountResolver};
use super::envelope::{decode_legacy_proxy, decode_uapi, decode_whm_api1};
use crate::address::domain_of;
use crate::config::PanelConfig;
use crate::error::{PanelError, PanelProtocol};

/// Converges an address's outgoing-mail flag to the requested value.
#[async_trait]
pub trait OutgoingSuspender: Send + Sync {
    async fn set_outgoing_suspended(&self, email: &str, suspended: bool) -> Result<(), PanelError>;
}

/// Direction of a suspension change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutgoingAction {
    Suspend,
    Unsuspend,
}

impl OutgoingAction {
    pub fn from_flag(suspended: bool) -> Self {
        if suspended { Self::Suspend } else { Self::Unsuspend }
    }

    /// Per-address function name (UAPI and cPanel API v3).
    pub fn email_function(self) -> &'static str {
        match self {
            Self::Suspend => "suspend_outgoing",
            Self::Unsuspend => "unsuspend_outgoing",
        }
    }

    /// Per-account WHM API 1 function name.
    pub fn account_function(self) -> &'static str {
        match self {
            Self::Suspend => "suspend_outgoing_email",
            Self::Unsuspend => "unsuspend_outgoing_email",
        }
    }
}

impl fmt::Display for OutgoingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.email_function())
    }
}

/// One step of the suspension plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    ModernUapi,
    LegacyProxy,
}

impl Attempt {
    pub fn protocol(self) -> PanelProtocol {
        match self {
            Self::ModernUapi => PanelProtocol::ModernUapi,
            Self::LegacyProxy => PanelProtocol::LegacyProxy,
        }
    }

    /// Whether a failure lets the plan continue with the next attempt.
    pub fn recoverable(self) -> bool {
        matches!(self, Self::ModernUapi)
    }
}

/// Control-panel client for outgoing-mail suspension.
pub struct SuspensionClient {
    config: Arc<PanelConfig>,
    modern: reqwest::Client,
    legacy: reqwest::Client,
    resolver: Arc<dyn AccountResolver>,
}

impl SuspensionClient {
    /// Build a client that resolves accounts through WHM.
    pub fn new(config: PanelConfig) -> Result<Self, PanelError> {
        let config = Arc::new(config);
        let resolver = Arc::new(WhmAccountResolver::new(Arc::clone(&config))?);
        Self::with_resolver(config, resolver)
    }

    pub fn with_resolver(
        config: Arc<PanelConfig>,
        resolver: Arc<dyn AccountResolver>,
    ) -> Result<Self, PanelError> {
        let modern = http_client(
            &config,
            config.modern_connect_timeout,
            PanelProtocol::ModernUapi,
        )?;
        let legacy = http_client(
            &config,
            config.legacy_connect_timeout,
            PanelProtocol::LegacyProxy,
        )?;
        Ok(Self {
            config,
            modern,
            legacy,
            resolver,
        })
    }

    /// Ordered attempts for the current configuration.
    pub fn plan(&self) -> Vec<Attempt> {
        if self.config.prefer_modern {
            vec![Attempt::ModernUapi, Attempt::LegacyProxy]
        } else {
            vec![Attempt::LegacyProxy]
        }
    }

    async fn run_plan(&self, action: OutgoingAction, email: &str) -> Result<(), PanelError> {
        let domain = domain_of(email).map_err(|_| PanelError::InvalidEmail(email.to_string()))?;
        info!(email, action = %action, "Changing outgoing mail state");

        let account = self.resolver.resolve_account(domain).await.inspect_err(|e| {
            error!(email, kind = e.kind(), error = %e, "Account lookup failed");
        })?;

        let mut last_error = None;
        for attempt in self.plan() {
            match self.attempt(attempt, action, email, &account).await {
                Ok(()) => {
                    info!(email, action = %action, protocol = %attempt.protocol(), "Panel call succeeded");
                    return Ok(());
                }
                Err(e) if attempt.recoverable() => {
                    warn!(
                        email,
                        protocol = %attempt.protocol(),
                        kind = e.kind(),
                        error = %e,
                        "Panel call failed, falling back"
                    );
                    last_error = Some(e);
                }
                Err(e) => {
                    error!(email, protocol = %attempt.protocol(), kind = e.kind(), error = %e, "Panel call failed");
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| PanelError::TransportFailed {
            protocol: PanelProtocol::LegacyProxy,
            reason: "no protocol attempted".into(),
        }))
    }

    async fn attempt(
        &self,
        attempt: Attempt,
        action: OutgoingAction,
        email: &str,
        account: &AccountIdentity,
    ) -> Result<(), PanelError> {
        match attempt {
            Attempt::ModernUapi => {
                let url = self.modern_url(action, email)?;
                debug!(url = %url, "UAPI request");
                let body = get_body(
                    &self.modern,
                    url,
                    cpanel_authorization(&self.config, &account.cpanel_user),
                    PanelProtocol::ModernUapi,
                )
                .await?;
                decode_uapi(&body)?.into_result(PanelProtocol::ModernUapi)
            }
            Attempt::LegacyProxy => {
                if action == OutgoingAction::Suspend && !self.config.legacy_suspend_delay.is_zero() {
                    tokio::time::sleep(self.config.legacy_suspend_delay).await;
                }
                let url = self.legacy_url(action, email, &account.cpanel_user)?;
                debug!(url = %url, "Legacy proxy request");
                let body = get_body(
                    &self.legacy,
                    url,
                    whm_authorization(&self.config),
                    PanelProtocol::LegacyProxy,
                )
                .await?;
                decode_legacy_proxy(&body)?.into_result(PanelProtocol::LegacyProxy)
            }
        }
    }

    /// Suspend or unsuspend outgoing mail for the whole account owning
    /// `email`'s domain, via WHM API 1.
    ///
    /// Not used by any chat command; kept for callers that need
    /// account-wide action.
    pub async fn set_account_outgoing_suspended(
        &self,
        email: &str,
        suspended: bool,
    ) -> Result<(), PanelError> {
        let action = OutgoingAction::from_flag(suspended);
        let domain = domain_of(email).map_err(|_| PanelError::InvalidEmail(email.to_string()))?;
        let account = self.resolver.resolve_account(domain).await?;
        info!(email, user = %account.cpanel_user, action = %action.account_function(), "Changing account outgoing mail state");

        let url = self.account_url(action, &account.cpanel_user)?;
        let body = get_body(
            &self.legacy,
            url,
            whm_authorization(&self.config),
            PanelProtocol::WhmApi1,
        )
        .await?;
        decode_whm_api1(&body)?.into_result(PanelProtocol::WhmApi1)
    }

    fn modern_url(&self, action: OutgoingAction, email: &str) -> Result<Url, PanelError> {
        let base = self.config.base_url(self.config.modern_port);
        build_url(
            &format!("{base}/execute/Email/{}", action.email_function()),
            &[("email", email)],
            PanelProtocol::ModernUapi,
        )
    }

    fn legacy_url(&self, action: OutgoingAction, email: &str, user: &str) -> Result<Url, PanelError> {
        let base = self.config.base_url(self.config.legacy_port);
        build_url(
            &format!("{base}/json-api/cpanel"),
            &[
                ("api.version", "1"),
                ("cpanel_jsonapi_user", user),
                ("cpanel_jsonapi_apiversion", "3"),
                ("cpanel_jsonapi_module", "Email"),
                ("cpanel_jsonapi_func", action.email_function()),
                ("email", email),
            ],
            PanelProtocol::LegacyProxy,
        )
    }

    fn account_url(&self, action: OutgoingAction, user: &str) -> Result<Url, PanelError> {
        let base = self.config.base_url(self.config.legacy_port);
        build_url(
            &format!("{base}/json-api/{}", action.account_function()),
            &[("api.version", "1"), ("user", user)],
            PanelProtocol::WhmApi1,
        )
    }
}

#[async_trait]
impl OutgoingSuspender for SuspensionClient {
    async fn set_outgoing_suspended(&self, email: &str, suspended: bool) -> Result<(), PanelError> {
        self.run_plan(OutgoingAction::from_flag(suspended), email).await
    }
}

// ── HTTP helpers ────────────────────────────────────────────────────

/// HTTP client for one panel port.
///
/// Certificate checks are off: the panel serves a self-signed or host-local
/// certificate. Idle connections are not pooled, so every call dials fresh.
pub(crate) fn http_client(
    config: &PanelConfig,
    connect_timeout: Duration,
    protocol: PanelProtocol,
) -> Result<reqwest::Client, PanelError> {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .connect_timeout(connect_timeout)
        .timeout(config.request_timeout)
        .tcp_keepalive(Duration::from_secs(30))
        .pool_max_idle_per_host(0)
        .build()
        .map_err(|e| PanelError::TransportFailed {
            protocol,
            reason: format!("failed to build HTTP client: {e}"),
        })
}

/// `whm <admin>:<token>` header value.
pub(crate) fn whm_authorization(config: &PanelConfig) -> String {
    format!("whm {}:{}", config.admin_user, config.api_token.expose_secret())
}

/// `cpanel <user>:<token>` header value.
pub(crate) fn cpanel_authorization(config: &PanelConfig, cpanel_user: &str) -> String {
    format!("cpanel {cpanel_user}:{}", config.api_token.expose_secret())
}

fn build_url(base: &str, params: &[(&str, &str)], protocol: PanelProtocol) -> Result<Url, PanelError> {
    Url::parse_with_params(base, params).map_err(|e| PanelError::TransportFailed {
        protocol,
        reason: format!("invalid panel URL: {e}"),
    })
}

/// Issue an authenticated GET and return the raw body, whatever the status.
pub(crate) async fn get_body(
    client: &reqwest::Client,
    url: Url,
    authorization: String,
    protocol: PanelProtocol,
) -> Result<Vec<u8>, PanelError> {
    let transport = |e: reqwest::Error| PanelError::TransportFailed {
        protocol,
        reason: e.to_string(),
    };
    let resp = client
        .get(url)
        .header(AUTHORIZATION, authorization)
        .send()
        .await
        .map_err(transport)?;
    let status = resp.status();
    let body = resp.bytes().await.map_err(transport)?;
    debug!(protocol = %protocol, status = %status, bytes = body.len(), "Panel response");
    Ok(body.to_vec())
}
