//! Provider-level session: trades the long-lived API token for a short-lived
//! bearer token, resolves the organization and hands the authenticated client
//! to every resource handler.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::{ApiClient, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use crate::error::{Diagnostic, Error, Result};

/// Provider configuration block.
#[derive(Clone)]
pub struct ProviderConfig {
    pub api_token: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_token", &self.api_token.as_ref().map(|_| "(sensitive)"))
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderConfig {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: Some(api_token.into()),
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    id_token: String,
}

#[derive(Deserialize)]
struct Organization {
    id: String,
}

/// An authenticated, organization-scoped API session.
#[derive(Debug, Clone)]
pub struct Session {
    api: ApiClient,
    organization_id: String,
}

impl Session {
    pub async fn connect(config: &ProviderConfig) -> Result<Self> {
        let api_token = config
            .api_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                Error::invalid(
                    Diagnostic::error(
                        "Missing API Token Configuration",
                        "The API token is required to authenticate with Pomerium Zero.",
                    )
                    .with_attribute("provider.api_token"),
                )
            })?;

        let api = ApiClient::new(&config.base_url, config.timeout)?;

        debug!("exchanging API token");
        let token = exchange_token(&api, api_token)
            .await
            .map_err(|e| Error::Session {
                summary: "Unable to Authenticate to Pomerium Zero",
                source: Box::new(e),
            })?;
        let api = api.with_bearer(token);

        let organization_id = organization_id(&api).await.map_err(|e| Error::Session {
            summary: "Unable to Fetch Organization ID",
            source: Box::new(e),
        })?;
        info!(%organization_id, "provider configured");

        Ok(Self {
            api,
            organization_id,
        })
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }

    /// Path below `/organizations/{id}/`.
    pub fn org_path(&self, rest: &str) -> String {
        format!(
            "organizations/{}/{}",
            self.organization_id,
            rest.trim_start_matches('/')
        )
    }
}

async fn exchange_token(api: &ApiClient, api_token: &str) -> Result<String> {
    let resp: TokenResponse = api
        .post_json(
            "token",
            &TokenRequest {
                refresh_token: api_token,
            },
            StatusCode::OK,
        )
        .await?;
    Ok(resp.id_token)
}

async fn organization_id(api: &ApiClient) -> Result<String> {
    let mut organizations: Vec<Organization> = api.get_json("organizations").await?;
    if organizations.len() != 1 {
        return Err(Error::diagnostic(
            "Unexpected organizations",
            format!(
                "unexpected number of organizations returned: {}",
                organizations.len()
            ),
        ));
    }
    Ok(organizations.remove(0).id)
}
