use crate::error::{DiscoveryError, Result};

/// Lifecycle of one discovery session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Results may still be reported
    Active,

    /// Discovery window closed normally
    Completed,

    /// Session terminated abnormally or was cancelled
    Failed,
}

/// Notification the engine is about to deliver for a session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    ResourcesFound,
    Completed,
    Failed,
}

impl SessionState {
    /// Apply an event, returning the next state.
    ///
    /// Any event on a terminal state is a contract violation.
    pub fn apply(self, event: SessionEvent) -> Result<Self> {
        match (self, event) {
            (Self::Active, SessionEvent::ResourcesFound) => Ok(Self::Active),
            (Self::Active, SessionEvent::Completed) => Ok(Self::Completed),
            (Self::Active, SessionEvent::Failed) => Ok(Self::Failed),
            (state, event) => Err(DiscoveryError::invalid_state(format!(
                "{:?} after terminal state {:?}",
                event, state
            ))),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}
