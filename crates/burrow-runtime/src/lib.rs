//! Sandbox session orchestration for burrow.
//!
//! An [`engine::Engine`] drives exactly one session: it creates the
//! ephemeral root, pulls the image into it, hands the populated root to the
//! [`launcher`], and removes the root again however the run ends.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod engine;
pub mod launcher;
pub mod session;
