//! PID namespace isolation.
//!
//! Provides the sandboxed command with its own process ID space, where it
//! runs as PID 1.

use burrow_common::error::{BurrowError, Result};

/// Creates a new PID namespace for the calling process.
///
/// After a successful call, the next `fork(2)` child will see
/// itself as PID 1 inside the new namespace.
///
/// # Errors
///
/// Returns an error if the `unshare(CLONE_NEWPID)` syscall fails.
#[cfg(target_os = "linux")]
pub fn create_pid_namespace() -> Result<()> {
    use nix::sched::{CloneFlags, unshare};

    unshare(CloneFlags::CLONE_NEWPID).map_err(|e| BurrowError::Isolation {
        message: format!("PID namespace creation failed: {e}"),
    })?;
    tracing::debug!("PID namespace created");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: PID namespaces require Linux.
#[cfg(not(target_os = "linux"))]
pub fn create_pid_namespace() -> Result<()> {
    Err(BurrowError::Isolation {
        message: "Linux required for PID namespaces".into(),
    })
}
