//! Automation error types.

use std::time::Duration;
use thiserror::Error;

use super::end_meeting::EndMeetingState;

/// Errors from executing a command against the target application.
///
/// An element that cannot be found is not an error; it is reported as
/// [`CommandOutcome::ControlNotFound`](super::CommandOutcome) or used to
/// infer an `unknown` status.
#[derive(Debug, Error)]
pub enum AutomationError {
    /// The target application is not running.
    #[error("Target application is not running")]
    AppNotRunning,

    /// The target application lost focus before a step that requires it.
    #[error("Target application is not the active application")]
    AppNotActive,

    /// No window of the target application looks like the meeting window.
    #[error("Could not find the meeting window")]
    MeetingWindowNotFound,

    /// A state-machine deadline passed before its predicate held.
    #[error("Timed out in state {state:?} after {waited:?}")]
    Timeout {
        /// The state that timed out.
        state: EndMeetingState,
        /// How long the state waited.
        waited: Duration,
    },

    /// The end-meeting sequence was run from the `Failed` state.
    #[error("End meeting sequence already failed")]
    Aborted,

    /// No automation backend is available in this build.
    #[error("No UI automation backend is available: {0}")]
    ProviderUnavailable(String),
}

/// Result type for automation operations.
pub type AutomationResult<T> = Result<T, AutomationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_state() {
        let err = AutomationError::Timeout {
            state: EndMeetingState::ActivatingApp,
            waited: Duration::from_millis(500),
        };
        let msg = err.to_string();
        assert!(msg.contains("ActivatingApp"));
        assert!(msg.contains("500ms"));
    }
}
