//! Domain → owning cPanel account lookup.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;

use super::client::{get_body, http_client, whm_authorization};
use super::envelope::{Envelope, WhmApi1Envelope};
use crate::config::PanelConfig;
use crate::error::{PanelError, PanelProtocol};

/// The cPanel account that owns a mail domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountIdentity {
    pub domain: String,
    pub cpanel_user: String,
}

/// Resolves the account owning a domain. Called fresh for every
/// suspension; results are not cached.
#[async_trait]
pub trait AccountResolver: Send + Sync {
    async fn resolve_account(&self, domain: &str) -> Result<AccountIdentity, PanelError>;
}

/// Looks the owner up with WHM's `domainuserdata`.
pub struct WhmAccountResolver {
    config: Arc<PanelConfig>,
    client: reqwest::Client,
}

impl WhmAccountResolver {
    pub fn new(config: Arc<PanelConfig>) -> Result<Self, PanelError> {
        let client = http_client(
            &config,
            config.legacy_connect_timeout,
            PanelProtocol::WhmApi1,
        )?;
        Ok(Self { config, client })
    }

    fn lookup_url(&self, domain: &str) -> Result<Url, PanelError> {
        let base = self.config.base_url(self.config.legacy_port);
        Url::parse_with_params(
            &format!("{base}/json-api/domainuserdata"),
            &[("api.version", "1"), ("domain", domain)],
        )
        .map_err(|e| PanelError::TransportFailed {
            protocol: PanelProtocol::WhmApi1,
            reason: format!("invalid panel URL: {e}"),
        })
    }

    async fn lookup(&self, domain: &str) -> Result<String, PanelError> {
        let url = self.lookup_url(domain)?;
        let body = get_body(
            &self.client,
            url,
            whm_authorization(&self.config),
            PanelProtocol::WhmApi1,
        )
        .await?;

        let envelope: WhmApi1Envelope =
            serde_json::from_slice(&body).map_err(|e| PanelError::DecodeFailed {
                protocol: PanelProtocol::WhmApi1,
                reason: e.to_string(),
            })?;
        if !envelope.status_ok() {
            return Err(PanelError::PanelRejected {
                protocol: PanelProtocol::WhmApi1,
                message: envelope.error_message(),
            });
        }
        envelope
            .userdata_user()
            .map(str::to_string)
            .ok_or_else(|| PanelError::DecodeFailed {
                protocol: PanelProtocol::WhmApi1,
                reason: "response has no userdata.user".into(),
            })
    }
}

#[async_trait]
impl AccountResolver for WhmAccountResolver {
    async fn resolve_account(&self, domain: &str) -> Result<AccountIdentity, PanelError> {
        match self.lookup(domain).await {
            Ok(cpanel_user) => {
                tracing::debug!(domain, user = %cpanel_user, "Resolved account");
                Ok(AccountIdentity {
                    domain: domain.to_string(),
                    cpanel_user,
                })
            }
            Err(e) => Err(PanelError::AccountLookupFailed {
                domain: domain.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn lookup_url_encodes_domain() {
        let config = PanelConfig::new("panel.local", "root", SecretString::from("t"));
        let resolver = WhmAccountResolver::new(Arc::new(config)).unwrap();
        let url = resolver.lookup_url("example.com").unwrap();
        assert_eq!(
            url.as_str(),
            "https://panel.local:2087/json-api/domainuserdata?api.version=1&domain=example.com"
        );
    }

    #[tokio::test]
    async fn unreachable_panel_is_lookup_failure() {
        let mut config = PanelConfig::new("127.0.0.1", "root", SecretString::from("t"));
        config.legacy_port = 1;
        config.use_tls = false;
        let resolver = WhmAccountResolver::new(Arc::new(config)).unwrap();

        let err = resolver.resolve_account("example.com").await.unwrap_err();
        assert_eq!(err.kind(), "account_lookup_failed");
        assert!(err.to_string().contains("example.com"));
    }
}
