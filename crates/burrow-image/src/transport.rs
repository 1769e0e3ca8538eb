//! HTTP transport used by the registry client.
//!
//! The registry protocol only needs plain `GET` requests with a couple of
//! headers, so the seam is a single-method trait. [`ReqwestTransport`] is
//! the production implementation.

use std::fmt;
use std::io::Read;
use std::time::Duration;

use burrow_common::constants::APP_NAME;
use burrow_common::error::{BurrowError, Result};
use thiserror::Error;

/// A `GET` request to a registry endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Absolute URL, query string included.
    pub url: String,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    /// Creates a request without headers.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the first value of `name`, compared case-insensitively.
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

// Requests carry bearer tokens; keep them out of debug output.
impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(k, v)| {
                let shown = if k.eq_ignore_ascii_case("authorization") {
                    "<redacted>"
                } else {
                    v.as_str()
                };
                (k.as_str(), shown)
            })
            .collect();
        f.debug_struct("HttpRequest")
            .field("url", &self.url)
            .field("headers", &headers)
            .finish()
    }
}

/// Response status plus a streaming body.
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body, read lazily.
    pub body: Box<dyn Read + Send>,
}

impl HttpResponse {
    /// Returns whether the status is in the 2xx range.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Reads the whole body, refusing bodies larger than `limit` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the body exceeds `limit`.
    pub fn read_limited(self, limit: u64) -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        let _ = self.body.take(limit + 1).read_to_end(&mut buf)?;
        if buf.len() as u64 > limit {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("response body exceeds {limit} bytes"),
            ));
        }
        Ok(buf)
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Failure to obtain any response at all.
#[derive(Debug, Error)]
#[error("GET {url} failed: {message}")]
pub struct TransportError {
    /// URL that was requested.
    pub url: String,
    /// Description of the transport failure.
    pub message: String,
}

/// Issues registry `GET` requests.
pub trait Transport: Send + Sync {
    /// Sends `request` and returns the response head with a streaming body.
    ///
    /// A non-success status is not an error at this level.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` on connection, TLS, or timeout failures.
    fn get(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, TransportError>;
}

/// Blocking `reqwest` transport with a per-request timeout.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Builds a transport whose requests (body included) time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::Config` if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("burrow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BurrowError::Config {
                message: format!("cannot build {APP_NAME} HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        tracing::debug!(url = %request.url, "GET");
        let mut builder = self.client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder.send().map_err(|e| TransportError {
            url: request.url.clone(),
            message: e.to_string(),
        })?;
        let status = response.status().as_u16();
        tracing::debug!(url = %request.url, status, "response received");
        Ok(HttpResponse {
            status,
            body: Box::new(response),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_authorization() {
        let request = HttpRequest::get("https://registry.example/v2/")
            .header("Authorization", "Bearer secret-token")
            .header("Accept", "application/json");
        let shown = format!("{request:?}");
        assert!(!shown.contains("secret-token"));
        assert!(shown.contains("application/json"));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let request = HttpRequest::get("https://x").header("Accept", "a/b");
        assert_eq!(request.header_value("accept"), Some("a/b"));
        assert_eq!(request.header_value("authorization"), None);
    }

    #[test]
    fn read_limited_rejects_oversized_bodies() {
        let response = HttpResponse {
            status: 200,
            body: Box::new(std::io::Cursor::new(vec![0_u8; 16])),
        };
        assert!(response.read_limited(8).is_err());

        let response = HttpResponse {
            status: 200,
            body: Box::new(std::io::Cursor::new(vec![1_u8; 8])),
        };
        assert_eq!(response.read_limited(8).expect("fits").len(), 8);
    }

    #[test]
    fn success_range_is_2xx() {
        let ok = HttpResponse {
            status: 204,
            body: Box::new(std::io::empty()),
        };
        let missing = HttpResponse {
            status: 404,
            body: Box::new(std::io::empty()),
        };
        assert!(ok.is_success());
        assert!(!missing.is_success());
    }

    #[test]
    fn reqwest_transport_builds() {
        assert!(ReqwestTransport::new(Duration::from_secs(5)).is_ok());
    }
}
