//! Root filesystem switching via `chroot(2)`.
//!
//! The switch is prepared on the host side (path validation, C string
//! conversion, a report pipe) and applied in the child between `fork(2)`
//! and `exec(2)`. The launcher itself never changes its root, so host paths
//! such as the ephemeral root stay resolvable for cleanup.

use std::ffi::{CString, OsString};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use burrow_common::error::{BurrowError, Result};

/// Child-side step of a root switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchStep {
    /// `sethostname(2)` inside the new UTS namespace.
    Hostname,
    /// `chroot(2)` into the new root.
    Chroot,
    /// `chdir("/")` after the root change.
    Chdir,
}

impl SwitchStep {
    const fn marker(self) -> u8 {
        match self {
            Self::Hostname => 1,
            Self::Chroot => 2,
            Self::Chdir => 3,
        }
    }

    const fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            1 => Some(Self::Hostname),
            2 => Some(Self::Chroot),
            3 => Some(Self::Chdir),
            _ => None,
        }
    }
}

impl fmt::Display for SwitchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hostname => write!(f, "sethostname"),
            Self::Chroot => write!(f, "chroot"),
            Self::Chdir => write!(f, "chdir"),
        }
    }
}

/// A root switch armed for one child process.
///
/// [`apply`](Self::apply) performs no heap allocation, which keeps it safe
/// to call from a `pre_exec` hook. A failing step is written as a one-byte
/// marker to a close-on-exec pipe read by the matching [`SwitchReport`].
#[derive(Debug)]
pub struct RootSwitch {
    root: PathBuf,
    root_c: CString,
    hostname: Option<OsString>,
    failure_tx: File,
}

/// Launcher-side end of a [`RootSwitch`]'s failure pipe.
#[derive(Debug)]
pub struct SwitchReport {
    failure_rx: File,
}

impl RootSwitch {
    /// Prepares a switch into `root`, optionally setting `hostname` first.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::Isolation` if `root` is not an existing
    /// directory, contains an interior NUL byte, or the report pipe cannot
    /// be created.
    pub fn new(root: &Path, hostname: Option<&str>) -> Result<(Self, SwitchReport)> {
        let metadata = std::fs::metadata(root).map_err(|e| BurrowError::Isolation {
            message: format!("new root {} is not accessible: {e}", root.display()),
        })?;
        if !metadata.is_dir() {
            return Err(BurrowError::Isolation {
                message: format!("new root {} is not a directory", root.display()),
            });
        }
        let root_c =
            CString::new(root.as_os_str().as_bytes()).map_err(|_| BurrowError::Isolation {
                message: format!("new root {} contains a NUL byte", root.display()),
            })?;
        let (failure_rx, failure_tx) = report_pipe()?;
        tracing::debug!(root = %root.display(), ?hostname, "root switch prepared");
        Ok((
            Self {
                root: root.to_path_buf(),
                root_c,
                hostname: hostname.map(OsString::from),
                failure_tx,
            },
            SwitchReport { failure_rx },
        ))
    }

    /// Returns the host path of the new root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sets the hostname (if configured), changes the root, and moves the
    /// working directory to the new `/`.
    ///
    /// Intended for the child process only; calling it in the launcher
    /// would strand the launcher inside the sandbox.
    ///
    /// # Errors
    ///
    /// Returns the raw OS error of the failing syscall.
    #[cfg(target_os = "linux")]
    pub fn apply(&self) -> io::Result<()> {
        if let Some(hostname) = &self.hostname {
            crate::namespace::uts::set_hostname(hostname)
                .map_err(|e| self.report(SwitchStep::Hostname, e))?;
        }
        nix::unistd::chroot(self.root_c.as_c_str())
            .map_err(|e| self.report(SwitchStep::Chroot, e.into()))?;
        nix::unistd::chdir("/").map_err(|e| self.report(SwitchStep::Chdir, e.into()))?;
        Ok(())
    }

    /// Stub for non-Linux platforms.
    ///
    /// # Errors
    ///
    /// Always returns `Unsupported`.
    #[cfg(not(target_os = "linux"))]
    pub fn apply(&self) -> io::Result<()> {
        Err(self.report(
            SwitchStep::Chroot,
            io::Error::from(io::ErrorKind::Unsupported),
        ))
    }

    fn report(&self, step: SwitchStep, error: io::Error) -> io::Error {
        let _ = (&self.failure_tx).write(&[step.marker()]);
        error
    }
}

impl SwitchReport {
    /// Returns the step that failed in the child, if one reported.
    ///
    /// Never blocks; call it once the child has exited or exec'd.
    #[must_use]
    pub fn failed_step(&self) -> Option<SwitchStep> {
        let mut marker = [0_u8; 1];
        match (&self.failure_rx).read(&mut marker) {
            Ok(1) => SwitchStep::from_marker(marker[0]),
            _ => None,
        }
    }
}

#[cfg(target_os = "linux")]
fn report_pipe() -> Result<(File, File)> {
    use nix::fcntl::OFlag;

    let (rx, tx) = nix::unistd::pipe2(OFlag::O_CLOEXEC | OFlag::O_NONBLOCK).map_err(|e| {
        BurrowError::Isolation {
            message: format!("cannot create root switch report pipe: {e}"),
        }
    })?;
    Ok((File::from(rx), File::from(tx)))
}

#[cfg(not(target_os = "linux"))]
fn report_pipe() -> Result<(File, File)> {
    let (rx, tx) = nix::unistd::pipe().map_err(|e| BurrowError::Isolation {
        message: format!("cannot create root switch report pipe: {e}"),
    })?;
    Ok((File::from(rx), File::from(tx)))
}
