//! UI automation of the conferencing application.
//!
//! The engine never talks to a platform API directly. Everything goes
//! through a [`UiAutomationProvider`], which hands out opaque
//! [`ElementHandle`]s into the application's live element graph. That graph
//! is owned by another process, can change between two calls, and may
//! contain cycles, so every lookup is a bounded search with its own visited
//! set (see [`search`]).
//!
//! # Commands
//!
//! | Verb        | Mechanism                                         |
//! |-------------|---------------------------------------------------|
//! | `mute`      | press "Mute audio" unless "Unmute audio" is shown |
//! | `unmute`    | press "Unmute audio" unless "Mute audio" is shown |
//! | `videoOn`   | press "Start video" unless "Stop video" is shown  |
//! | `videoOff`  | press "Stop video" unless "Start video" is shown  |
//! | `endForAll` | end-meeting state machine ([`EndMeetingState`])   |

mod end_meeting;
mod engine;
mod error;
pub mod poll;
pub mod provider;
pub mod search;
pub mod simulated;

pub use end_meeting::{ActivationAttempt, ActivationTarget, EndMeetingState};
pub use engine::{
    AutomationEngine, AutomationSettings, CommandOutcome, ControlLabels, DEFAULT_ACTIVATE_TIMEOUT,
    DEFAULT_CONFIRM_TIMEOUT, DEFAULT_MAX_SEARCH_DEPTH, DEFAULT_MEETING_WINDOW_TITLE,
    DEFAULT_POLL_INTERVAL, DEFAULT_WINDOW_TIMEOUT,
};
pub use error::{AutomationError, AutomationResult};
pub use provider::{
    ActivationStrategy, AttributeValue, ElementHandle, ProcessRef, TargetApp, UiAutomationProvider,
};
pub use search::ElementQuery;
pub use simulated::SimulatedProvider;
