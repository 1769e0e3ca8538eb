//! Unified error taxonomy for the burrow workspace.
//!
//! Every stage of a sandbox session reports failures through one variant of
//! [`BurrowError`]. The variant identifies the stage (auth, manifest, a
//! specific layer, isolation, spawn) and carries enough context for the user
//! to tell which step broke.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::constants::{LAUNCHER_FAILURE_EXIT_CODE, SPAWN_FAILURE_EXIT_CODE};

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum BurrowError {
    /// The token endpoint was unreachable, answered with a failure status,
    /// or returned a body without a usable token.
    #[error("pull token for {repository}: {message}")]
    Auth {
        /// Repository the token was requested for.
        repository: String,
        /// Description of the failure.
        message: String,
    },

    /// The manifest endpoint was unreachable, answered with a failure
    /// status, or returned a body that does not match the expected schema.
    #[error("manifest {repository}:{reference}: {message}")]
    Manifest {
        /// Repository of the requested image.
        repository: String,
        /// Tag or digest that was requested.
        reference: String,
        /// Description of the failure.
        message: String,
    },

    /// Fetching, writing, verifying, or extracting a layer failed.
    #[error("layer {index} ({digest}): {message}")]
    Layer {
        /// One-based position of the layer in the manifest.
        index: usize,
        /// Content digest of the layer.
        digest: String,
        /// Description of the failure.
        message: String,
    },

    /// An I/O operation on the host filesystem failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Entering the isolated execution context failed.
    #[error("isolation failed: {message}")]
    Isolation {
        /// Description of the failed privileged operation.
        message: String,
    },

    /// The command could not be resolved or started.
    #[error("cannot start {command}: {message}")]
    Spawn {
        /// Command as requested by the user.
        command: String,
        /// Description of the failure.
        message: String,
    },

    /// A configuration value or user input is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Downloaded content does not match its advertised digest.
    #[error("hash mismatch for {resource}: expected {expected}, got {actual}")]
    HashMismatch {
        /// Resource that failed validation.
        resource: String,
        /// Expected digest.
        expected: String,
        /// Actual computed digest.
        actual: String,
    },

    /// The session was interrupted or ran past its deadline.
    #[error("cancelled during {stage}: {reason}")]
    Cancelled {
        /// Stage that was running when the cancellation was observed.
        stage: String,
        /// Why the session was cancelled.
        reason: String,
    },
}

impl BurrowError {
    /// Returns the session stage this error belongs to.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Auth { .. } => Stage::Auth,
            Self::Manifest { .. } => Stage::Manifest,
            Self::Layer { .. } | Self::HashMismatch { .. } => Stage::Layer,
            Self::Io { .. } => Stage::Filesystem,
            Self::Isolation { .. } => Stage::Isolation,
            Self::Spawn { .. } => Stage::Spawn,
            Self::Config { .. } => Stage::Config,
            Self::Cancelled { .. } => Stage::Cancelled,
        }
    }

    /// Returns the process exit code the launcher reports for this error.
    ///
    /// Spawn failures get their own code so they are never confused with a
    /// launcher-side failure that happened before the command existed.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Spawn { .. } => SPAWN_FAILURE_EXIT_CODE,
            _ => LAUNCHER_FAILURE_EXIT_CODE,
        }
    }
}

/// Session stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Pull token exchange.
    Auth,
    /// Manifest retrieval and validation.
    Manifest,
    /// Blob download, verification, or extraction.
    Layer,
    /// Host filesystem operations (ephemeral root, device tree).
    Filesystem,
    /// Namespace creation and root switching.
    Isolation,
    /// Command resolution and process start.
    Spawn,
    /// Configuration and argument validation.
    Config,
    /// Interrupt or deadline.
    Cancelled,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth => write!(f, "auth"),
            Self::Manifest => write!(f, "manifest"),
            Self::Layer => write!(f, "layer"),
            Self::Filesystem => write!(f, "filesystem"),
            Self::Isolation => write!(f, "isolation"),
            Self::Spawn => write!(f, "spawn"),
            Self::Config => write!(f, "config"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BurrowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_error_has_distinct_exit_code() {
        let err = BurrowError::Spawn {
            command: "nope".into(),
            message: "not found".into(),
        };
        assert_eq!(err.exit_code(), SPAWN_FAILURE_EXIT_CODE);
        assert_eq!(err.stage(), Stage::Spawn);
    }

    #[test]
    fn launcher_errors_exit_with_one() {
        let errors = [
            BurrowError::Auth {
                repository: "library/alpine".into(),
                message: "no token".into(),
            },
            BurrowError::Isolation {
                message: "chroot: EPERM".into(),
            },
            BurrowError::Cancelled {
                stage: "layer 1".into(),
                reason: "interrupted".into(),
            },
        ];
        for err in &errors {
            assert_eq!(err.exit_code(), 1, "{err}");
        }
    }

    #[test]
    fn layer_error_message_names_digest() {
        let err = BurrowError::Layer {
            index: 2,
            digest: "sha256:abc".into(),
            message: "HTTP 404".into(),
        };
        assert_eq!(err.to_string(), "layer 2 (sha256:abc): HTTP 404");
        assert_eq!(err.stage().to_string(), "layer");
    }

    #[test]
    fn hash_mismatch_belongs_to_layer_stage() {
        let err = BurrowError::HashMismatch {
            resource: "blob".into(),
            expected: "sha256:aa".into(),
            actual: "sha256:bb".into(),
        };
        assert_eq!(err.stage(), Stage::Layer);
    }
}
