//! Runtime configuration for a sandbox session.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_AUTH_SERVICE, DEFAULT_AUTH_URL, DEFAULT_PULL_TIMEOUT_SECS, DEFAULT_REGISTRY_URL,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};
use crate::error::{BurrowError, Result};

/// Endpoints of the registry images are pulled from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the registry; `/v2/...` paths are appended to it.
    pub registry_url: String,
    /// Token endpoint issuing anonymous pull tokens.
    pub auth_url: String,
    /// Service name passed to the token endpoint.
    pub auth_service: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY_URL.into(),
            auth_url: DEFAULT_AUTH_URL.into(),
            auth_service: DEFAULT_AUTH_SERVICE.into(),
        }
    }
}

/// Root configuration for one `burrow run` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurrowConfig {
    /// Registry endpoints.
    pub registry: RegistryConfig,
    /// Timeout applied to each registry request, body included.
    pub request_timeout: Duration,
    /// Deadline for the whole pull phase (token, manifest, all layers).
    pub pull_timeout: Duration,
    /// Directory the ephemeral root is created under (system temp dir if unset).
    pub temp_dir: Option<PathBuf>,
    /// Whether downloaded blobs are checked against their digest.
    pub verify_digests: bool,
    /// Hostname set inside the new UTS namespace.
    pub hostname: Option<String>,
}

impl Default for BurrowConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            pull_timeout: Duration::from_secs(DEFAULT_PULL_TIMEOUT_SECS),
            temp_dir: None,
            verify_digests: true,
            hostname: None,
        }
    }
}

impl BurrowConfig {
    /// Checks the configuration for values that can never work.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::Config` for non-HTTP registry URLs, zero
    /// timeouts, or an invalid hostname.
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("registry URL", &self.registry.registry_url),
            ("auth URL", &self.registry.auth_url),
        ] {
            if !url.starts_with("https://") && !url.starts_with("http://") {
                return Err(BurrowError::Config {
                    message: format!("{name} must be an http(s) URL: {url}"),
                });
            }
        }
        if self.request_timeout.is_zero() || self.pull_timeout.is_zero() {
            return Err(BurrowError::Config {
                message: "timeouts must be greater than zero".into(),
            });
        }
        if let Some(hostname) = &self.hostname {
            validate_hostname(hostname)?;
        }
        Ok(())
    }
}

/// Validates a hostname against the kernel's length limit and RFC 1123 labels.
fn validate_hostname(hostname: &str) -> Result<()> {
    let valid = !hostname.is_empty()
        && hostname.len() <= 64
        && hostname.split('.').all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });
    if valid {
        Ok(())
    } else {
        Err(BurrowError::Config {
            message: format!("invalid hostname: {hostname:?}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_points_at_docker_hub() {
        let config = BurrowConfig::default();
        assert_eq!(config.registry.registry_url, "https://registry.hub.docker.com");
        assert_eq!(config.registry.auth_service, "registry.docker.io");
        assert!(config.verify_digests);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_non_http_registry() {
        let mut config = BurrowConfig::default();
        config.registry.registry_url = "ftp://registry.example".into();
        assert!(matches!(config.validate(), Err(BurrowError::Config { .. })));
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let config = BurrowConfig {
            request_timeout: Duration::ZERO,
            ..BurrowConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_checks_hostname() {
        let mut config = BurrowConfig {
            hostname: Some("sandbox-1".into()),
            ..BurrowConfig::default()
        };
        assert!(config.validate().is_ok());

        config.hostname = Some("-bad".into());
        assert!(config.validate().is_err());

        config.hostname = Some("a".repeat(65));
        assert!(config.validate().is_err());
    }
}
