//! Lifecycle tracking for a single sandbox session.

use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{SessionId, SessionState};

/// The state of the one session a launcher invocation runs.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    state: SessionState,
}

impl Session {
    /// Starts a session in the `Created` state.
    #[must_use]
    pub fn new() -> Self {
        let id = SessionId::generate();
        tracing::debug!(session = %id, "session created");
        Self {
            id,
            state: SessionState::Created,
        }
    }

    /// Returns the session identifier.
    #[must_use]
    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::Config` if the transition is not allowed.
    pub fn advance(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(BurrowError::Config {
                message: format!("illegal session transition {} -> {next}", self.state),
            });
        }
        tracing::debug!(session = %self.id, from = %self.state, to = %next, "session state");
        self.state = next;
        Ok(())
    }

    /// Marks the session failed. No-op once the child has terminated.
    pub fn fail(&mut self) {
        if self.state.can_transition_to(SessionState::Failed) {
            tracing::debug!(session = %self.id, from = %self.state, "session failed");
            self.state = SessionState::Failed;
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
