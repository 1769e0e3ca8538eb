//! Linux namespace management for sandbox isolation.
//!
//! Provides safe wrappers around `unshare(2)` for the PID and UTS
//! namespaces. Network, mount, IPC, and user namespaces are not used.

pub mod pid;
pub mod uts;

use burrow_common::error::{BurrowError, Result};

/// Configuration for which namespaces to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceConfig {
    /// Isolate the PID namespace; the next child becomes PID 1.
    pub pid: bool,
    /// Isolate the UTS (hostname) namespace.
    pub uts: bool,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            pid: true,
            uts: true,
        }
    }
}

/// Creates all configured namespaces for the calling process.
///
/// The PID namespace only applies to children created afterwards; the
/// calling process keeps its own PID.
///
/// # Errors
///
/// Returns `BurrowError::Isolation` if any `unshare(2)` call fails.
pub fn create_namespaces(config: NamespaceConfig) -> Result<()> {
    tracing::info!(pid = config.pid, uts = config.uts, "creating namespaces");
    if config.uts {
        uts::create_uts_namespace()?;
    }
    if config.pid {
        pid::create_pid_namespace()?;
    }
    Ok(())
}

/// Fails with `BurrowError::Isolation` unless the process may create namespaces.
///
/// # Errors
///
/// Returns an error when the effective user is not root.
#[cfg(target_os = "linux")]
pub fn require_privilege() -> Result<()> {
    if nix::unistd::geteuid().is_root() {
        Ok(())
    } else {
        Err(BurrowError::Isolation {
            message: "chroot and namespace creation require root privileges".into(),
        })
    }
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error.
#[cfg(not(target_os = "linux"))]
pub fn require_privilege() -> Result<()> {
    Err(BurrowError::Isolation {
        message: "Linux required for sandbox isolation".into(),
    })
}
