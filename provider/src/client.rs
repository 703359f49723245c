//! JSON-over-HTTP client for the Pomerium Zero API.
//!
//! Every call names the one status code it accepts; anything else becomes
//! [`Error::UnexpectedStatus`] carrying the response body. There are no
//! retries: the first failure is returned to the caller.

use std::fmt;
use std::time::Duration;

use reqwest::{header, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Version 0 of the Pomerium Zero API.
pub const DEFAULT_BASE_URL: &str = "https://console.pomerium.app/api/v0";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    bearer: Option<String>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.bearer.is_some())
            .finish()
    }
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| Error::Transport {
                url: base_url.to_string(),
                source,
            })?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer: None,
        })
    }

    /// Same client, authenticating with `Authorization: Bearer <token>`.
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `GET` expecting 200 and a JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let text = self.execute(Method::GET, path, None, StatusCode::OK).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// `POST` a JSON body, expecting `expected` and a JSON response.
    pub async fn post_json<B, T>(&self, path: &str, body: &B, expected: StatusCode) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_vec(body)?;
        let text = self
            .execute(Method::POST, path, Some(body), expected)
            .await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// `PUT` a full document, expecting 200 and a JSON response.
    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_vec(body)?;
        let text = self
            .execute(Method::PUT, path, Some(body), StatusCode::OK)
            .await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// `DELETE` expecting 204 No Content.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.execute(Method::DELETE, path, None, StatusCode::NO_CONTENT)
            .await
            .map(|_| ())
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        expected: StatusCode,
    ) -> Result<String> {
        let url = self.url(path);
        let mut req = self
            .http
            .request(method.clone(), &url)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = &self.bearer {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            trace!(bytes = body.len(), "request body");
            req = req.body(body);
        }

        debug!(%method, %url, "sending request");
        let resp = req.send().await.map_err(|source| Error::Transport {
            url: url.clone(),
            source,
        })?;
        let status = resp.status();
        let text = resp.text().await.map_err(|source| Error::Transport {
            url: url.clone(),
            source,
        })?;
        debug!(%method, %url, status = status.as_u16(), "received response");
        trace!(bytes = text.len(), "response body");

        if status != expected {
            return Err(Error::UnexpectedStatus {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }
}
