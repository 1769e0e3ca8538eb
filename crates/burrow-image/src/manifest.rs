//! Image manifest model (Docker distribution schema 2).
//!
//! The registry can serve several manifest schemas for the same tag, chosen
//! by the `Accept` header. Only the v2 single-platform schema is accepted;
//! anything else is a hard error rather than a best-effort parse.

use burrow_common::constants::{
    MANIFEST_LIST_MEDIA_TYPE, MANIFEST_SCHEMA_VERSION, MANIFEST_V2_MEDIA_TYPE, MAX_IMAGE_LAYERS,
};
use burrow_common::types::Digest;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reference to a blob: its media type, size, and content digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced blob.
    pub media_type: String,
    /// Size of the blob in bytes.
    pub size: u64,
    /// Content address of the blob.
    pub digest: Digest,
}

/// One image version: its config blob and ordered layers (bottom to top).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Schema version, always 2.
    pub schema_version: u32,
    /// Manifest media type.
    pub media_type: String,
    /// Image configuration blob.
    pub config: Descriptor,
    /// Filesystem layers in extraction order.
    pub layers: Vec<Descriptor>,
}

/// Reasons a manifest body is rejected.
#[derive(Debug, Error)]
pub enum ManifestSchemaError {
    /// The body is not JSON or lacks required fields.
    #[error("malformed manifest: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The body uses another schema version.
    #[error("unsupported schemaVersion {found:?}, expected {}", MANIFEST_SCHEMA_VERSION)]
    SchemaVersion {
        /// Version found in the body, if any.
        found: Option<u64>,
    },

    /// The registry returned a multi-platform manifest list.
    #[error("manifest lists are not supported; request a platform-specific tag or digest")]
    ManifestList,

    /// The body declares an unexpected media type.
    #[error("unexpected mediaType {found:?}, expected {}", MANIFEST_V2_MEDIA_TYPE)]
    MediaType {
        /// Media type found in the body, if any.
        found: Option<String>,
    },

    /// The image has more layers than the launcher accepts.
    #[error("image has {count} layers, the maximum is {}", MAX_IMAGE_LAYERS)]
    TooManyLayers {
        /// Number of layers in the manifest.
        count: usize,
    },
}

impl Manifest {
    /// Parses and validates a manifest body.
    ///
    /// # Errors
    ///
    /// Returns `ManifestSchemaError` when the body is not a v2
    /// single-platform manifest.
    pub fn from_slice(body: &[u8]) -> Result<Self, ManifestSchemaError> {
        let value: serde_json::Value = serde_json::from_slice(body)?;

        let version = value.get("schemaVersion").and_then(serde_json::Value::as_u64);
        if version != Some(u64::from(MANIFEST_SCHEMA_VERSION)) {
            return Err(ManifestSchemaError::SchemaVersion { found: version });
        }

        let media_type = value.get("mediaType").and_then(serde_json::Value::as_str);
        match media_type {
            Some(MANIFEST_V2_MEDIA_TYPE) => {}
            Some(MANIFEST_LIST_MEDIA_TYPE) => return Err(ManifestSchemaError::ManifestList),
            other => {
                return Err(ManifestSchemaError::MediaType {
                    found: other.map(str::to_owned),
                });
            }
        }

        let manifest: Self = serde_json::from_value(value)?;
        if manifest.layers.len() > MAX_IMAGE_LAYERS {
            return Err(ManifestSchemaError::TooManyLayers {
                count: manifest.layers.len(),
            });
        }
        Ok(manifest)
    }

    /// Returns the sum of all layer sizes in bytes.
    #[must_use]
    pub fn total_layer_size(&self) -> u64 {
        self.layers.iter().map(|l| l.size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = "sha256:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const LAYER_1: &str = "sha256:bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
    const LAYER_2: &str = "sha256:cccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccc";

    fn v2_body(layers: &[&str]) -> String {
        let layers: Vec<String> = layers
            .iter()
            .map(|d| {
                format!(
                    r#"{{"mediaType":"application/vnd.docker.image.rootfs.diff.tar.gzip","size":10,"digest":"{d}"}}"#
                )
            })
            .collect();
        format!(
            r#"{{"schemaVersion":2,"mediaType":"{MANIFEST_V2_MEDIA_TYPE}",
                "config":{{"mediaType":"application/vnd.docker.container.image.v1+json","size":1469,"digest":"{CONFIG}"}},
                "layers":[{}]}}"#,
            layers.join(",")
        )
    }

    #[test]
    fn parses_v2_manifest_in_layer_order() {
        let manifest = Manifest::from_slice(v2_body(&[LAYER_1, LAYER_2]).as_bytes()).expect("parse");
        assert_eq!(manifest.schema_version, 2);
        assert_eq!(manifest.config.size, 1469);
        let digests: Vec<String> = manifest.layers.iter().map(|l| l.digest.to_string()).collect();
        assert_eq!(digests, vec![LAYER_1, LAYER_2]);
        assert_eq!(manifest.total_layer_size(), 20);
    }

    #[test]
    fn parses_manifest_without_layers() {
        let manifest = Manifest::from_slice(v2_body(&[]).as_bytes()).expect("parse");
        assert!(manifest.layers.is_empty());
    }

    #[test]
    fn rejects_schema_one_body() {
        let body = r#"{"schemaVersion":1,"name":"library/alpine","tag":"latest","fsLayers":[]}"#;
        let err = Manifest::from_slice(body.as_bytes()).unwrap_err();
        assert!(matches!(err, ManifestSchemaError::SchemaVersion { found: Some(1) }));
    }

    #[test]
    fn rejects_manifest_list() {
        let body = format!(r#"{{"schemaVersion":2,"mediaType":"{MANIFEST_LIST_MEDIA_TYPE}","manifests":[]}}"#);
        let err = Manifest::from_slice(body.as_bytes()).unwrap_err();
        assert!(matches!(err, ManifestSchemaError::ManifestList));
    }

    #[test]
    fn rejects_oci_media_type() {
        let body = v2_body(&[LAYER_1]).replace(
            MANIFEST_V2_MEDIA_TYPE,
            "application/vnd.oci.image.manifest.v1+json",
        );
        let err = Manifest::from_slice(body.as_bytes()).unwrap_err();
        assert!(matches!(err, ManifestSchemaError::MediaType { .. }));
    }

    #[test]
    fn rejects_missing_layers_field() {
        let body = format!(
            r#"{{"schemaVersion":2,"mediaType":"{MANIFEST_V2_MEDIA_TYPE}","config":{{"mediaType":"x","size":1,"digest":"{CONFIG}"}}}}"#
        );
        assert!(matches!(
            Manifest::from_slice(body.as_bytes()),
            Err(ManifestSchemaError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_invalid_layer_digest() {
        let body = v2_body(&["sha256:not-hex"]);
        assert!(matches!(
            Manifest::from_slice(body.as_bytes()),
            Err(ManifestSchemaError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_non_json() {
        assert!(Manifest::from_slice(b"<html>nope</html>").is_err());
    }

    #[test]
    fn rejects_too_many_layers() {
        let layers = vec![LAYER_1; MAX_IMAGE_LAYERS + 1];
        let err = Manifest::from_slice(v2_body(&layers).as_bytes()).unwrap_err();
        assert!(matches!(err, ManifestSchemaError::TooManyLayers { count } if count == MAX_IMAGE_LAYERS + 1));
    }
}
