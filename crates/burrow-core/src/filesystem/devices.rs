//! Minimal device tree for a freshly extracted root.
//!
//! Many programs open `/dev/null` unconditionally, while image layers
//! usually ship an empty `/dev`. The tree is built on the host side,
//! before the root switch, using paths explicitly joined onto the root.

use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::{Path, PathBuf};

use burrow_common::error::{BurrowError, Result};

/// How the null device ended up inside the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullDevice {
    /// The image already provided a character device.
    Existing,
    /// A character device (1, 3) was created with `mknod(2)`.
    CharDevice,
    /// `mknod(2)` was not permitted; an empty regular file stands in.
    PlaceholderFile,
}

/// Ensures `<root>/dev` exists and holds a usable `null` device.
///
/// A `dev` symlink shipped by the image is replaced by a real directory so
/// that nothing is created outside the root.
///
/// # Errors
///
/// Returns `BurrowError::Io` if the directory or the placeholder file
/// cannot be created.
pub fn prepare_device_tree(root: &Path) -> Result<NullDevice> {
    let dev = root.join("dev");
    ensure_real_dir(&dev)?;

    let null = dev.join("null");
    match std::fs::symlink_metadata(&null) {
        Ok(meta) if meta.file_type().is_char_device() => {
            tracing::debug!(path = %null.display(), "null device provided by image");
            return Ok(NullDevice::Existing);
        }
        Ok(meta) if meta.is_dir() => {
            std::fs::remove_dir_all(&null).map_err(|e| io_err(&null, e))?;
        }
        Ok(_) => std::fs::remove_file(&null).map_err(|e| io_err(&null, e))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_err(&null, e)),
    }

    let kind = match make_null_device(&null) {
        Ok(()) => NullDevice::CharDevice,
        Err(e) => {
            tracing::warn!(
                path = %null.display(),
                error = %e,
                "cannot create null character device, using an empty file"
            );
            let _ = std::fs::File::create(&null).map_err(|e| io_err(&null, e))?;
            NullDevice::PlaceholderFile
        }
    };
    std::fs::set_permissions(&null, std::fs::Permissions::from_mode(0o666))
        .map_err(|e| io_err(&null, e))?;
    tracing::debug!(path = %null.display(), ?kind, "device tree prepared");
    Ok(kind)
}

fn ensure_real_dir(dev: &Path) -> Result<()> {
    match std::fs::symlink_metadata(dev) {
        Ok(meta) if meta.is_dir() => return Ok(()),
        Ok(_) => std::fs::remove_file(dev).map_err(|e| io_err(dev, e))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_err(dev, e)),
    }
    std::fs::create_dir(dev).map_err(|e| io_err(dev, e))?;
    std::fs::set_permissions(dev, std::fs::Permissions::from_mode(0o755))
        .map_err(|e| io_err(dev, e))
}

#[cfg(target_os = "linux")]
fn make_null_device(path: &Path) -> nix::Result<()> {
    use nix::sys::stat::{Mode, SFlag, makedev, mknod};

    mknod(path, SFlag::S_IFCHR, Mode::from_bits_truncate(0o666), makedev(1, 3))
}

#[cfg(not(target_os = "linux"))]
fn make_null_device(_path: &Path) -> nix::Result<()> {
    Err(nix::errno::Errno::ENOSYS)
}

fn io_err(path: &Path, source: std::io::Error) -> BurrowError {
    BurrowError::Io {
        path: PathBuf::from(path),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_dev_and_null_in_empty_root() {
        let root = tempfile::tempdir().expect("tempdir");
        let kind = prepare_device_tree(root.path()).expect("prepare");

        let null = root.path().join("dev/null");
        let meta = std::fs::symlink_metadata(&null).expect("null exists");
        match kind {
            NullDevice::CharDevice => assert!(meta.file_type().is_char_device()),
            NullDevice::PlaceholderFile => assert!(meta.is_file()),
            NullDevice::Existing => unreachable!("root was empty"),
        }
        assert_eq!(meta.permissions().mode() & 0o777, 0o666);
    }

    #[test]
    fn replaces_regular_file_left_by_image() {
        let root = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(root.path().join("dev")).expect("mkdir");
        std::fs::write(root.path().join("dev/null"), b"garbage").expect("write");

        let _ = prepare_device_tree(root.path()).expect("prepare");
        let meta = std::fs::symlink_metadata(root.path().join("dev/null")).expect("meta");
        assert_eq!(meta.len(), 0);
    }

    #[test]
    fn dev_symlink_is_replaced_by_directory() {
        let root = tempfile::tempdir().expect("tempdir");
        let outside = tempfile::tempdir().expect("tempdir");
        std::os::unix::fs::symlink(outside.path(), root.path().join("dev")).expect("symlink");

        let _ = prepare_device_tree(root.path()).expect("prepare");
        let meta = std::fs::symlink_metadata(root.path().join("dev")).expect("meta");
        assert!(meta.is_dir());
        assert!(!outside.path().join("null").exists());
    }

    #[test]
    fn is_idempotent() {
        let root = tempfile::tempdir().expect("tempdir");
        let first = prepare_device_tree(root.path()).expect("first");
        let second = prepare_device_tree(root.path()).expect("second");
        if first == NullDevice::CharDevice {
            assert_eq!(second, NullDevice::Existing);
        } else {
            assert_eq!(second, NullDevice::PlaceholderFile);
        }
    }
}
