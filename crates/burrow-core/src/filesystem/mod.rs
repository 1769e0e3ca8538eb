//! Filesystem management for sandbox isolation.
//!
//! Provides the `chroot(2)` root switch executed by the sandboxed child and
//! the minimal device tree prepared inside the root beforehand.

pub mod chroot;
pub mod devices;
