//! UTS namespace isolation.
//!
//! Allows the sandboxed command to have its own hostname without
//! touching the host's.

use std::ffi::OsStr;

use burrow_common::error::{BurrowError, Result};

/// Creates a new UTS namespace for the calling process.
///
/// # Errors
///
/// Returns an error if the `unshare(CLONE_NEWUTS)` syscall fails.
#[cfg(target_os = "linux")]
pub fn create_uts_namespace() -> Result<()> {
    use nix::sched::{CloneFlags, unshare};

    unshare(CloneFlags::CLONE_NEWUTS).map_err(|e| BurrowError::Isolation {
        message: format!("UTS namespace creation failed: {e}"),
    })?;
    tracing::debug!("UTS namespace created");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: UTS namespaces require Linux.
#[cfg(not(target_os = "linux"))]
pub fn create_uts_namespace() -> Result<()> {
    Err(BurrowError::Isolation {
        message: "Linux required for UTS namespaces".into(),
    })
}

/// Sets the hostname of the current UTS namespace.
///
/// Does not allocate, so it may run between `fork(2)` and `exec(2)`.
///
/// # Errors
///
/// Returns the raw OS error if `sethostname(2)` fails.
#[cfg(target_os = "linux")]
pub fn set_hostname(hostname: &OsStr) -> std::io::Result<()> {
    nix::unistd::sethostname(hostname).map_err(std::io::Error::from)
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns `Unsupported`.
#[cfg(not(target_os = "linux"))]
pub fn set_hostname(_hostname: &OsStr) -> std::io::Result<()> {
    Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
}
