//! Registry client: pull-token exchange, manifest retrieval, blob requests.
//!
//! Pull tokens come from an authentication service that is separate from
//! the content registry, so a pull always takes two round trips before the
//! first blob: token, then manifest.

use std::fmt;

use burrow_common::cancel::CancelToken;
use burrow_common::config::RegistryConfig;
use burrow_common::constants::MANIFEST_V2_MEDIA_TYPE;
use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{Digest, ImageReference};
use serde::Deserialize;

use crate::manifest::Manifest;
use crate::transport::{HttpRequest, HttpResponse, Transport};

/// Upper bound for token and manifest bodies.
const MAX_METADATA_BYTES: u64 = 4 * 1024 * 1024;

/// Anonymous bearer token scoped to `pull` on one repository.
#[derive(Clone, PartialEq, Eq)]
pub struct PullToken(String);

impl PullToken {
    /// Wraps a raw token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn authorization(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for PullToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PullToken(<redacted>)")
    }
}

/// Body of the token endpoint; registries use either field name.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

impl TokenResponse {
    fn into_token(self) -> Option<PullToken> {
        self.token
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.access_token.filter(|t| !t.trim().is_empty()))
            .map(PullToken)
    }
}

/// Client for one registry and its token service.
pub struct RegistryClient {
    transport: Box<dyn Transport>,
    config: RegistryConfig,
}

impl fmt::Debug for RegistryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RegistryClient {
    /// Creates a client sending requests through `transport`.
    #[must_use]
    pub fn new(transport: Box<dyn Transport>, config: RegistryConfig) -> Self {
        Self { transport, config }
    }

    /// Requests an anonymous pull token for the image's repository.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::Auth` if the request fails, the status is not
    /// 2xx, the body is not JSON, or it carries no non-empty token.
    pub fn obtain_pull_token(
        &self,
        image: &ImageReference,
        cancel: &CancelToken,
    ) -> Result<PullToken> {
        cancel.check("auth")?;
        let repository = image.repository();
        let auth_err = |message: String| BurrowError::Auth {
            repository: repository.to_owned(),
            message,
        };

        let scope = format!("repository:{repository}:pull");
        let url = reqwest::Url::parse_with_params(
            &self.config.auth_url,
            &[
                ("service", self.config.auth_service.as_str()),
                ("scope", scope.as_str()),
            ],
        )
        .map_err(|e| auth_err(format!("invalid token endpoint {}: {e}", self.config.auth_url)))?;

        tracing::info!(repository, "requesting pull token");
        let response = self
            .transport
            .get(&HttpRequest::get(url.as_str()))
            .map_err(|e| auth_err(e.to_string()))?;
        let body = read_success_body(response).map_err(auth_err)?;

        let parsed: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| auth_err(format!("token response is not valid JSON: {e}")))?;
        let token = parsed
            .into_token()
            .ok_or_else(|| auth_err("token response has no token or access_token".into()))?;
        tracing::debug!(repository, "pull token obtained");
        Ok(token)
    }

    /// Fetches and validates the v2 manifest for the image's tag or digest.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::Manifest` on transport failure, non-2xx status,
    /// malformed JSON, or a schema other than the v2 single-platform one.
    pub fn fetch_manifest(
        &self,
        token: &PullToken,
        image: &ImageReference,
        cancel: &CancelToken,
    ) -> Result<Manifest> {
        cancel.check("manifest")?;
        let manifest_err = |message: String| BurrowError::Manifest {
            repository: image.repository().to_owned(),
            reference: image.reference().to_string(),
            message,
        };

        let url = format!(
            "{}/v2/{}/manifests/{}",
            self.base_url(),
            image.repository(),
            image.reference()
        );
        let request = HttpRequest::get(url)
            .header("Authorization", token.authorization())
            .header("Accept", MANIFEST_V2_MEDIA_TYPE);

        tracing::info!(image = %image, "fetching manifest");
        let response = self
            .transport
            .get(&request)
            .map_err(|e| manifest_err(e.to_string()))?;
        let body = read_success_body(response).map_err(manifest_err)?;

        let manifest = Manifest::from_slice(&body).map_err(|e| manifest_err(e.to_string()))?;
        tracing::info!(
            image = %image,
            layers = manifest.layers.len(),
            bytes = manifest.total_layer_size(),
            "manifest fetched"
        );
        Ok(manifest)
    }

    /// Opens the blob identified by `digest`, returning its streaming body.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::Layer` (tagged with `index`) on transport
    /// failure or a non-2xx status.
    pub fn open_blob(
        &self,
        token: &PullToken,
        image: &ImageReference,
        index: usize,
        digest: &Digest,
    ) -> Result<HttpResponse> {
        let url = format!(
            "{}/v2/{}/blobs/{digest}",
            self.base_url(),
            image.repository()
        );
        let request = HttpRequest::get(url).header("Authorization", token.authorization());
        let layer_err = |message: String| BurrowError::Layer {
            index,
            digest: digest.to_string(),
            message,
        };

        let response = self
            .transport
            .get(&request)
            .map_err(|e| layer_err(e.to_string()))?;
        if !response.is_success() {
            return Err(layer_err(format!("blob request returned HTTP {}", response.status)));
        }
        Ok(response)
    }

    fn base_url(&self) -> &str {
        self.config.registry_url.trim_end_matches('/')
    }
}

/// Reads a small body, turning non-2xx statuses into an error message.
fn read_success_body(response: HttpResponse) -> std::result::Result<Vec<u8>, String> {
    let status = response.status;
    let success = response.is_success();
    let body = response
        .read_limited(MAX_METADATA_BYTES)
        .map_err(|e| format!("cannot read response body: {e}"))?;
    if !success {
        let snippet: String = String::from_utf8_lossy(&body).chars().take(200).collect();
        return Err(format!("HTTP {status}: {}", snippet.trim()));
    }
    Ok(body)
}
