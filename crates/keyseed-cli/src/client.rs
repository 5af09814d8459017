//! HTTP client for the keyseed server.
//!
//! [`HttpSecretStore`] implements [`SecretStore`] over the `/v1/secrets`
//! routes so the provisioning job and the workload binding run unchanged
//! against a remote store. The `sys` helpers return raw JSON for display.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use keyseed_core::access::Credential;
use keyseed_core::error::StoreError;
use keyseed_core::secret::{SecretName, SecretValue};
use keyseed_core::store::{SecretStore, StoreOperation};

#[derive(Deserialize)]
struct ExistsResponse {
    exists: bool,
}

#[derive(Deserialize)]
struct SecretResponse {
    value: SecretValue,
}

#[derive(Serialize)]
struct WriteRequest<'a> {
    value: &'a SecretValue,
}

/// A remote secret store reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSecretStore {
    http: reqwest::Client,
    addr: String,
}

impl HttpSecretStore {
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(addr: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            addr: addr.trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.addr)
    }

    /// `GET` a system route, optionally authenticated.
    pub async fn get_json(&self, path: &str, credential: Option<&Credential>) -> Result<Value> {
        let mut req = self.http.get(self.url(path));
        if let Some(c) = credential {
            req = req.bearer_auth(c.to_bearer().expose());
        }
        let resp = req.send().await.context("request failed")?;
        handle_response(resp).await
    }

    /// `POST` a system route without a body or credential.
    pub async fn post_no_auth(&self, path: &str) -> Result<Value> {
        let resp = self
            .http
            .post(self.url(path))
            .send()
            .await
            .context("request failed")?;
        handle_response(resp).await
    }

    async fn send(
        &self,
        req: RequestBuilder,
        credential: &Credential,
        name: &SecretName,
        operation: StoreOperation,
    ) -> Result<reqwest::Response, StoreError> {
        debug!(%operation, secret = %name, "secret store request");
        let resp = req
            .bearer_auth(credential.to_bearer().expose())
            .send()
            .await
            .map_err(|e| StoreError::Transport {
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        Err(match status {
            StatusCode::UNAUTHORIZED => StoreError::Unauthenticated,
            StatusCode::FORBIDDEN => StoreError::PermissionDenied {
                operation,
                name: name.to_string(),
            },
            StatusCode::NOT_FOUND => StoreError::NotFound {
                name: name.to_string(),
            },
            StatusCode::SERVICE_UNAVAILABLE => StoreError::NotInitialized,
            other => {
                let body = resp.text().await.unwrap_or_default();
                StoreError::Transport {
                    reason: format!("server returned {other}: {body}"),
                }
            }
        })
    }
}

#[async_trait]
impl SecretStore for HttpSecretStore {
    async fn exists(&self, credential: &Credential, name: &SecretName) -> Result<bool, StoreError> {
        let req = self.http.get(self.url(&format!("/v1/secrets/{name}/exists")));
        let resp = self
            .send(req, credential, name, StoreOperation::Exists)
            .await?;
        let body: ExistsResponse = resp.json().await.map_err(transport)?;
        Ok(body.exists)
    }

    async fn set(
        &self,
        credential: &Credential,
        name: &SecretName,
        value: &SecretValue,
    ) -> Result<(), StoreError> {
        let req = self
            .http
            .put(self.url(&format!("/v1/secrets/{name}")))
            .json(&WriteRequest { value });
        self.send(req, credential, name, StoreOperation::Set).await?;
        Ok(())
    }

    async fn get(
        &self,
        credential: &Credential,
        name: &SecretName,
    ) -> Result<SecretValue, StoreError> {
        let req = self.http.get(self.url(&format!("/v1/secrets/{name}")));
        let resp = self.send(req, credential, name, StoreOperation::Get).await?;
        let body: SecretResponse = resp.json().await.map_err(transport)?;
        Ok(body.value)
    }
}

#[allow(clippy::needless_pass_by_value)]
fn transport(e: reqwest::Error) -> StoreError {
    StoreError::Transport {
        reason: format!("invalid response: {e}"),
    }
}

async fn handle_response(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    if status == StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }
    let body = resp.text().await.context("failed to read response body")?;
    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v["message"].as_str().map(str::to_owned))
            .unwrap_or(body);
        bail!("server returned {status}: {message}");
    }
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).context("failed to parse response JSON")
}
