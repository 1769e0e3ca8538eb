//! In-memory registry for tests.
//!
//! [`FakeRegistry`] implements [`Transport`] by serving canned responses
//! keyed on URL path and recording every request it receives, so tests can
//! assert which endpoints were (or were not) contacted.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use burrow_common::config::RegistryConfig;
use burrow_common::constants::MANIFEST_V2_MEDIA_TYPE;

use crate::hash::digest_reader;
use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};

#[derive(Debug, Default)]
struct Inner {
    routes: HashMap<String, (u16, Vec<u8>)>,
    requests: Vec<HttpRequest>,
}

/// Canned-response registry shared between a test and the client under test.
#[derive(Debug, Clone, Default)]
pub struct FakeRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl FakeRegistry {
    /// Creates a registry with no routes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Endpoints matching the routes this registry serves.
    #[must_use]
    pub fn config() -> RegistryConfig {
        RegistryConfig {
            registry_url: "https://registry.test".into(),
            auth_url: "https://auth.test/token".into(),
            auth_service: "registry.test".into(),
        }
    }

    /// Serves `body` with `status` for requests whose path equals `path`.
    pub fn respond(&self, path: &str, status: u16, body: Vec<u8>) {
        let _ = self.lock().routes.insert(path.to_owned(), (status, body));
    }

    /// Serves a token endpoint body.
    pub fn serve_token(&self, body: &str) {
        self.respond("/token", 200, body.as_bytes().to_vec());
    }

    /// Serves a manifest body for `repository` at `reference`.
    pub fn serve_manifest(&self, repository: &str, reference: &str, body: &str) {
        self.respond(
            &format!("/v2/{repository}/manifests/{reference}"),
            200,
            body.as_bytes().to_vec(),
        );
    }

    /// Serves a blob for `repository` under `digest`.
    pub fn serve_blob(&self, repository: &str, digest: &str, blob: Vec<u8>) {
        self.respond(&format!("/v2/{repository}/blobs/{digest}"), 200, blob);
    }

    /// Serves a token, a manifest listing `layers` in order, and every layer blob.
    pub fn serve_image(&self, repository: &str, tag: &str, layers: &[Vec<u8>]) {
        self.serve_token(r#"{"token":"test-token"}"#);
        let refs: Vec<&[u8]> = layers.iter().map(Vec::as_slice).collect();
        self.serve_manifest(repository, tag, &manifest_json(&refs));
        for layer in layers {
            self.serve_blob(repository, &blob_digest(layer), layer.clone());
        }
    }

    /// Returns every request received so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.lock().requests.clone()
    }

    /// Returns the paths of blob requests received so far, in order.
    #[must_use]
    pub fn blob_requests(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| path_of(&r.url).to_owned())
            .filter(|p| p.contains("/blobs/"))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for FakeRegistry {
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut inner = self.lock();
        inner.requests.push(request.clone());
        let path = path_of(&request.url);
        let Some((status, body)) = inner.routes.get(path).cloned() else {
            return Err(TransportError {
                url: request.url.clone(),
                message: "connection refused".into(),
            });
        };
        Ok(HttpResponse {
            status,
            body: Box::new(std::io::Cursor::new(body)),
        })
    }
}

/// Strips scheme, host, and query from a URL.
fn path_of(url: &str) -> &str {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = without_scheme
        .find('/')
        .map_or("/", |i| &without_scheme[i..]);
    path.split('?').next().unwrap_or(path)
}

/// Returns the `sha256:` digest string of `blob`.
#[must_use]
pub fn blob_digest(blob: &[u8]) -> String {
    digest_reader(blob).map_or_else(|_| String::new(), |d| d.to_string())
}

/// Builds a v2 manifest body listing `layers` (raw blobs) in order.
#[must_use]
pub fn manifest_json(layers: &[&[u8]]) -> String {
    let config_digest = blob_digest(b"{}");
    let layers: Vec<String> = layers
        .iter()
        .map(|blob| {
            format!(
                r#"{{"mediaType":"application/vnd.docker.image.rootfs.diff.tar.gzip","size":{},"digest":"{}"}}"#,
                blob.len(),
                blob_digest(blob)
            )
        })
        .collect();
    format!(
        r#"{{"schemaVersion":2,"mediaType":"{MANIFEST_V2_MEDIA_TYPE}","config":{{"mediaType":"application/vnd.docker.container.image.v1+json","size":2,"digest":"{config_digest}"}},"layers":[{}]}}"#,
        layers.join(",")
    )
}

/// An entry of a fixture layer.
#[derive(Debug, Clone, Copy)]
pub enum Entry<'a> {
    /// Regular file with contents and mode.
    File(&'a str, &'a [u8], u32),
    /// Directory with mode.
    Dir(&'a str, u32),
    /// Symlink from path to target.
    Symlink(&'a str, &'a str),
}

/// Builds an uncompressed tar archive from `entries`.
#[must_use]
pub fn tar_layer(entries: &[Entry<'_>]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for entry in entries {
        let mut header = tar::Header::new_gnu();
        let appended = match *entry {
            Entry::File(path, data, mode) => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_size(data.len() as u64);
                header.set_mode(mode);
                header.set_mtime(1_700_000_000);
                header.set_cksum();
                builder.append_data(&mut header, path, data)
            }
            Entry::Dir(path, mode) => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_size(0);
                header.set_mode(mode);
                header.set_mtime(1_700_000_000);
                header.set_cksum();
                builder.append_data(&mut header, path, std::io::empty())
            }
            Entry::Symlink(path, target) => {
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_size(0);
                header.set_mode(0o777);
                builder.append_link(&mut header, path, target)
            }
        };
        if let Err(e) = appended {
            tracing::error!(error = %e, "cannot build fixture layer");
        }
    }
    builder.into_inner().unwrap_or_default()
}

/// Builds a gzip-compressed tar archive from `entries`.
#[must_use]
pub fn tar_gz_layer(entries: &[Entry<'_>]) -> Vec<u8> {
    let tar = tar_layer(entries);
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
    if encoder.write_all(&tar).is_err() {
        return Vec::new();
    }
    encoder.finish().unwrap_or_default()
}
