//! Cooperative cancellation with an optional deadline.
//!
//! Long-running stages (blob downloads, archive extraction) poll a
//! [`CancelToken`] between chunks so that an interrupt or an expired
//! deadline stops the session at a point where cleanup can still run.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::{BurrowError, Result};

/// Shared cancellation flag plus an optional absolute deadline.
///
/// Clones share the same flag; cancelling one cancels all of them.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// Creates a token that is never cancelled unless [`cancel`](Self::cancel) is called.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a token sharing this flag that also expires after `timeout`.
    #[must_use]
    pub fn with_deadline(&self, timeout: Duration) -> Self {
        let deadline = Instant::now().checked_add(timeout);
        Self {
            flag: Arc::clone(&self.flag),
            deadline: match (self.deadline, deadline) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            },
        }
    }

    /// Requests cancellation of every clone of this token.
    pub fn cancel(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            tracing::warn!("cancellation requested, cleaning up");
        }
    }

    /// Returns whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Returns the time left before the deadline, if one is set.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fails if the token was cancelled or its deadline has passed.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::Cancelled` naming `stage`.
    pub fn check(&self, stage: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(BurrowError::Cancelled {
                stage: stage.into(),
                reason: "interrupted".into(),
            });
        }
        if self.remaining().is_some_and(|left| left.is_zero()) {
            return Err(BurrowError::Cancelled {
                stage: stage.into(),
                reason: "deadline exceeded".into(),
            });
        }
        Ok(())
    }
}
