//! # burrow-image
//!
//! Everything needed to turn an image reference into a populated root
//! filesystem:
//! - **Rootfs**: the ephemeral root directory and its guaranteed removal.
//! - **Transport**: the HTTP seam the registry client talks through.
//! - **Registry**: pull-token exchange, manifest retrieval, blob requests.
//! - **Manifest**: the v2 manifest model and its schema checks.
//! - **Layers**: sequential download and extraction into the root.
//! - **Hashing**: SHA-256 content verification.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod hash;
pub mod layer;
pub mod manifest;
pub mod registry;
pub mod rootfs;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;
