//! # burrow-core
//!
//! Low-level Linux isolation primitives for the burrow launcher.
//!
//! This crate provides safe abstractions over:
//! - **Namespaces**: PID and UTS isolation via `unshare(2)`.
//! - **Filesystem**: the `chroot(2)` root switch and the minimal `/dev`
//!   tree a freshly extracted image needs.
//!
//! Every syscall goes through `nix`; failures surface as
//! `BurrowError::Isolation` or as raw `io::Error`s for code running
//! between `fork` and `exec`.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod filesystem;
pub mod namespace;
