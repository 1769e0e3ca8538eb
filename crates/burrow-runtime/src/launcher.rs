//! Sandbox launcher: executable resolution, isolation, spawn, and wait.
//!
//! The launch is split into typed phases so that host paths and
//! root-relative paths never mix:
//!
//! 1. [`resolve_executable`] looks the command up on the host.
//! 2. [`PreparedRoot`] adds the minimal device tree to the populated root.
//! 3. [`Isolation::enter`] checks privilege, unshares the PID and UTS
//!    namespaces in the launcher, and arms the root switch.
//! 4. [`IsolatedCommand::spawn`] forks; the child changes its root and
//!    hostname, then execs. The launcher stays on the host root.

use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus};

use burrow_common::constants::{LAUNCHER_FAILURE_EXIT_CODE, SIGNAL_EXIT_CODE_BASE};
use burrow_common::error::{BurrowError, Result};
use burrow_core::filesystem::chroot::{RootSwitch, SwitchReport};
use burrow_core::filesystem::devices::{NullDevice, prepare_device_tree};
use burrow_core::namespace::{self, NamespaceConfig};

/// Resolves `command` to an absolute host path.
///
/// A command containing `/` is taken as a path (made absolute against the
/// current directory); anything else is searched on `PATH`.
///
/// # Errors
///
/// Returns `BurrowError::Spawn` if the command cannot be found.
pub fn resolve_executable(command: &str) -> Result<PathBuf> {
    let spawn_err = |message: String| BurrowError::Spawn {
        command: command.to_owned(),
        message,
    };
    if command.is_empty() {
        return Err(spawn_err("empty command".into()));
    }

    let resolved = if command.contains('/') {
        let path = Path::new(command);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| spawn_err(format!("cannot read current directory: {e}")))?
                .join(path)
        }
    } else {
        which::which(command).map_err(|e| spawn_err(format!("not found in PATH: {e}")))?
    };
    tracing::debug!(command, resolved = %resolved.display(), "executable resolved");
    Ok(resolved)
}

/// A populated root with its device tree in place, still addressed by host path.
#[derive(Debug)]
pub struct PreparedRoot {
    root: PathBuf,
    null_device: NullDevice,
}

impl PreparedRoot {
    /// Creates `<root>/dev` and `<root>/dev/null`.
    ///
    /// # Errors
    ///
    /// Returns an error if the `dev` directory cannot be created.
    pub fn prepare(root: &Path) -> Result<Self> {
        let null_device = prepare_device_tree(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            null_device,
        })
    }

    /// Host path of the root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// How `/dev/null` was provided.
    #[must_use]
    pub const fn null_device(&self) -> NullDevice {
        self.null_device
    }
}

/// One-shot isolation setup. Consumed by [`enter`](Self::enter).
#[derive(Debug, Clone, Default)]
pub struct Isolation {
    namespaces: NamespaceConfig,
    hostname: Option<String>,
}

impl Isolation {
    /// Isolation with new PID and UTS namespaces and an optional hostname.
    #[must_use]
    pub fn new(hostname: Option<String>) -> Self {
        Self {
            namespaces: NamespaceConfig::default(),
            hostname,
        }
    }

    /// Creates the namespaces and arms the root switch for `executable`.
    ///
    /// Mutates process-wide state: after this call every child the
    /// launcher forks lands in the new PID namespace.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::Isolation` when not privileged, when the root
    /// is unusable, or when `unshare(2)` fails.
    pub fn enter(
        self,
        root: &PreparedRoot,
        executable: PathBuf,
        args: Vec<String>,
    ) -> Result<IsolatedCommand> {
        namespace::require_privilege()?;
        let (switch, report) = RootSwitch::new(root.root(), self.hostname.as_deref())?;
        namespace::create_namespaces(self.namespaces)?;
        tracing::info!(root = %root.root().display(), "isolation entered");
        Ok(IsolatedCommand {
            switch,
            report,
            executable,
            args,
        })
    }
}

/// A command ready to run inside the sandbox.
#[derive(Debug)]
pub struct IsolatedCommand {
    switch: RootSwitch,
    report: SwitchReport,
    executable: PathBuf,
    args: Vec<String>,
}

impl IsolatedCommand {
    /// Forks the child, switches its root, and execs the command with
    /// inherited standard streams.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::Isolation` if the child could not switch its
    /// root or hostname, and `BurrowError::Spawn` if the exec itself failed,
    /// including when the executable does not exist inside the root.
    pub fn spawn(self) -> Result<RunningChild> {
        let Self {
            switch,
            report,
            executable,
            args,
        } = self;
        let command_name = executable.display().to_string();

        let mut command = Command::new(&executable);
        let _ = command.args(&args);
        // SAFETY: the hook runs in the forked child before exec and only
        // issues sethostname/chroot/chdir on pre-built C strings; it does
        // not allocate or take locks.
        unsafe {
            let _ = command.pre_exec(move || switch.apply());
        }

        let child = command.spawn().map_err(|e| match report.failed_step() {
            Some(step) => BurrowError::Isolation {
                message: format!("{step} failed in the sandboxed child: {e}"),
            },
            None => BurrowError::Spawn {
                command: command_name.clone(),
                message: e.to_string(),
            },
        })?;
        tracing::info!(pid = child.id(), command = %command_name, "child started");
        Ok(RunningChild {
            child,
            command: command_name,
        })
    }
}

/// A started child process.
#[derive(Debug)]
pub struct RunningChild {
    child: Child,
    command: String,
}

impl RunningChild {
    /// Host PID of the child.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Blocks until the child terminates and returns its exit code.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::Spawn` if waiting fails.
    pub fn wait(mut self) -> Result<i32> {
        let status = self.child.wait().map_err(|e| BurrowError::Spawn {
            command: self.command.clone(),
            message: format!("wait failed: {e}"),
        })?;
        let code = exit_code(status);
        tracing::info!(command = %self.command, %status, code, "child exited");
        Ok(code)
    }
}

/// Maps a wait status to a process exit code; signals become `128 + signal`.
#[must_use]
pub fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or_else(|| {
        status
            .signal()
            .map_or(LAUNCHER_FAILURE_EXIT_CODE, |signal| SIGNAL_EXIT_CODE_BASE + signal)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_command_on_path() {
        let path = resolve_executable("sh").expect("sh on PATH");
        assert!(path.is_absolute());
        assert!(path.ends_with("sh"));
    }

    #[test]
    fn absolute_path_is_kept() {
        let path = resolve_executable("/bin/does-not-need-to-exist").expect("resolve");
        assert_eq!(path, PathBuf::from("/bin/does-not-need-to-exist"));
    }

    #[test]
    fn relative_path_is_made_absolute() {
        let path = resolve_executable("./tool").expect("resolve");
        assert!(path.is_absolute());
        assert!(path.ends_with("tool"));
    }

    #[test]
    fn unknown_command_is_spawn_error() {
        let err = resolve_executable("burrow-no-such-command-xyz").unwrap_err();
        assert!(matches!(err, BurrowError::Spawn { .. }));
        assert_eq!(err.exit_code(), 127);
    }

    #[test]
    fn empty_command_is_spawn_error() {
        assert!(matches!(
            resolve_executable(""),
            Err(BurrowError::Spawn { .. })
        ));
    }

    #[test]
    fn exit_codes_pass_through() {
        assert_eq!(exit_code(ExitStatus::from_raw(0)), 0);
        assert_eq!(exit_code(ExitStatus::from_raw(7 << 8)), 7);
    }

    #[test]
    fn signal_maps_to_128_plus_signal() {
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 137);
        assert_eq!(exit_code(ExitStatus::from_raw(15)), 143);
    }

    #[test]
    fn prepared_root_has_dev_null() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let prepared = PreparedRoot::prepare(tmp.path()).expect("prepare");
        assert_eq!(prepared.root(), tmp.path());
        assert!(tmp.path().join("dev/null").exists());
    }

    #[test]
    fn child_side_root_switch_failure_is_isolation_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("root");
        std::fs::create_dir(&root).expect("mkdir");
        let (switch, report) = RootSwitch::new(&root, None).expect("prepare");
        std::fs::remove_dir(&root).expect("remove root");

        let command = IsolatedCommand {
            switch,
            report,
            executable: PathBuf::from("/bin/sh"),
            args: vec!["-c".into(), "exit 0".into()],
        };
        let err = command.spawn().unwrap_err();
        assert!(matches!(err, BurrowError::Isolation { .. }), "{err}");
        assert!(err.to_string().contains("chroot"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn isolation_requires_privilege() {
        if nix::unistd::geteuid().is_root() {
            return;
        }
        let tmp = tempfile::tempdir().expect("tempdir");
        let prepared = PreparedRoot::prepare(tmp.path()).expect("prepare");
        let err = Isolation::new(None)
            .enter(&prepared, PathBuf::from("/bin/sh"), Vec::new())
            .unwrap_err();
        assert!(matches!(err, BurrowError::Isolation { .. }));
    }
}
