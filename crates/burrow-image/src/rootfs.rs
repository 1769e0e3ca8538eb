//! Ephemeral root directory management.
//!
//! Each session gets a fresh, uniquely named directory that layers are
//! extracted into and that later becomes the sandbox's `/`. The directory
//! is removed when the [`EphemeralRoot`] is destroyed or dropped, so every
//! exit path (success, fetch failure, launch failure, unwinding) cleans up.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use burrow_common::constants::ROOT_DIR_PREFIX;
use burrow_common::error::{BurrowError, Result};
use tempfile::TempDir;

/// A uniquely named temporary directory owned by one session.
#[derive(Debug)]
pub struct EphemeralRoot {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl EphemeralRoot {
    /// Creates a new root under `base`, or under the system temp dir.
    ///
    /// Names are randomized and created exclusively, so concurrent sessions
    /// on the same host never collide.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::Io` if the directory cannot be created.
    pub fn create(base: Option<&Path>) -> Result<Self> {
        let base = base.map_or_else(std::env::temp_dir, Path::to_path_buf);
        let dir = tempfile::Builder::new()
            .prefix(ROOT_DIR_PREFIX)
            .tempdir_in(&base)
            .map_err(|e| BurrowError::Io {
                path: base.clone(),
                source: e,
            })?;
        let path = dir.path().to_path_buf();
        // Image roots are world-traversable like a real `/`.
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).map_err(|e| {
            BurrowError::Io {
                path: path.clone(),
                source: e,
            }
        })?;
        tracing::info!(path = %path.display(), "ephemeral root created");
        Ok(Self {
            path,
            dir: Some(dir),
        })
    }

    /// Returns the host path of the root.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the root and everything in it, reporting failures.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::Io` if the directory could not be removed.
    pub fn destroy(mut self) -> Result<()> {
        self.remove()
    }

    fn remove(&mut self) -> Result<()> {
        let Some(dir) = self.dir.take() else {
            return Ok(());
        };
        if let Err(first) = dir.close() {
            // Layers may leave read-only directories behind; open them up and retry.
            tracing::debug!(path = %self.path.display(), error = %first, "retrying root removal");
            make_tree_writable(&self.path);
            std::fs::remove_dir_all(&self.path).map_err(|e| BurrowError::Io {
                path: self.path.clone(),
                source: e,
            })?;
        }
        tracing::info!(path = %self.path.display(), "ephemeral root removed");
        Ok(())
    }
}

impl Drop for EphemeralRoot {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            tracing::error!(error = %e, "failed to remove ephemeral root");
        }
    }
}

/// Adds owner rwx to every directory below `path`, ignoring errors.
fn make_tree_writable(path: &Path) {
    let Ok(meta) = std::fs::symlink_metadata(path) else {
        return;
    };
    if !meta.is_dir() {
        return;
    }
    let mode = meta.permissions().mode() | 0o700;
    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode));
    if let Ok(entries) = std::fs::read_dir(path) {
        for entry in entries.flatten() {
            make_tree_writable(&entry.path());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_makes_unique_directories() {
        let base = tempfile::tempdir().expect("tempdir");
        let a = EphemeralRoot::create(Some(base.path())).expect("create a");
        let b = EphemeralRoot::create(Some(base.path())).expect("create b");
        assert_ne!(a.path(), b.path());
        assert!(a.path().is_dir());
        assert!(
            a.path()
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(ROOT_DIR_PREFIX))
        );
    }

    #[test]
    fn destroy_removes_directory_and_contents() {
        let base = tempfile::tempdir().expect("tempdir");
        let root = EphemeralRoot::create(Some(base.path())).expect("create");
        let path = root.path().to_path_buf();
        std::fs::create_dir_all(path.join("usr/bin")).expect("mkdir");
        std::fs::write(path.join("usr/bin/tool"), b"#!/bin/sh").expect("write");

        root.destroy().expect("destroy");
        assert!(!path.exists());
    }

    #[test]
    fn drop_removes_directory() {
        let base = tempfile::tempdir().expect("tempdir");
        let path = {
            let root = EphemeralRoot::create(Some(base.path())).expect("create");
            root.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn destroy_handles_read_only_directories() {
        let base = tempfile::tempdir().expect("tempdir");
        let root = EphemeralRoot::create(Some(base.path())).expect("create");
        let locked = root.path().join("locked");
        std::fs::create_dir(&locked).expect("mkdir");
        std::fs::write(locked.join("file"), b"x").expect("write");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o555)).expect("chmod");

        let path = root.path().to_path_buf();
        root.destroy().expect("destroy");
        assert!(!path.exists());
    }

    #[test]
    fn create_fails_under_missing_base() {
        let base = tempfile::tempdir().expect("tempdir");
        let err = EphemeralRoot::create(Some(&base.path().join("missing"))).unwrap_err();
        assert!(matches!(err, BurrowError::Io { .. }));
    }
}
