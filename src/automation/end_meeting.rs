//! End-meeting-for-all state machine.
//!
//! The application only shows the "end meeting for all" confirmation when
//! its meeting window is the focused window of the frontmost application,
//! and it is frequently in the background when a remote command arrives.
//! So the flow is:
//!
//! ```text
//! Idle -> ActivatingApp -> ActivatingMeetingWindow -> ClickingClose -> ConfirmingEnd -> Done
//!            |                   |                                          |
//!            +-------------------+------------------------------------------+--> Failed
//! ```
//!
//! Every waiting state polls its success predicate with [`poll_until`]
//! under its own deadline. A missed deadline fails the whole command; there
//! is no outer retry.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::engine::AutomationEngine;
use super::error::{AutomationError, AutomationResult};
use super::poll::poll_until;
use super::provider::{
    attr, role, ActivationStrategy, AttributeValue, ElementHandle, ProcessRef, TargetApp,
};

/// States of the end-meeting flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndMeetingState {
    /// Not started.
    Idle,
    /// Bringing the application to the front.
    ActivatingApp,
    /// Raising and focusing the meeting window.
    ActivatingMeetingWindow,
    /// Pressing the "Close" menu item.
    ClickingClose,
    /// Pressing the confirmation button until the meeting is gone.
    ConfirmingEnd,
    /// The meeting was ended.
    Done,
    /// A state failed; the command is reported failed.
    Failed,
}

/// What an activation attempt is trying to bring forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationTarget {
    /// The application process.
    Application(ProcessRef),
    /// One window of the application.
    Window(ElementHandle),
}

/// Bookkeeping for one activating state. Discarded when the state ends.
#[derive(Debug, Clone)]
pub struct ActivationAttempt {
    /// What is being activated.
    pub target: ActivationTarget,
    /// When the state gives up.
    pub deadline: Instant,
    /// Activation rounds issued so far.
    pub attempt_count: u32,
}

impl ActivationAttempt {
    fn start(target: ActivationTarget, timeout: Duration) -> Self {
        Self {
            target,
            deadline: Instant::now() + timeout,
            attempt_count: 0,
        }
    }

    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// One run of the end-meeting state machine.
pub(crate) struct EndMeetingFlow<'a> {
    engine: &'a AutomationEngine,
    state: EndMeetingState,
    app: Option<TargetApp>,
    window: Option<ElementHandle>,
}

impl<'a> EndMeetingFlow<'a> {
    pub(crate) fn new(engine: &'a AutomationEngine) -> Self {
        Self {
            engine,
            state: EndMeetingState::Idle,
            app: None,
            window: None,
        }
    }

    /// Drive the machine to `Done` or `Failed`.
    pub(crate) async fn run(mut self) -> AutomationResult<()> {
        info!("Attempting to end meeting for all");
        loop {
            let step = match self.state {
                EndMeetingState::Idle => self.locate_app(),
                EndMeetingState::ActivatingApp => self.activate_app().await,
                EndMeetingState::ActivatingMeetingWindow => self.activate_meeting_window().await,
                EndMeetingState::ClickingClose => self.click_close(),
                EndMeetingState::ConfirmingEnd => self.confirm_end().await,
                EndMeetingState::Done => {
                    info!("Meeting ended");
                    return Ok(());
                }
                EndMeetingState::Failed => return Err(AutomationError::Aborted),
            };

            match step {
                Ok(next) => {
                    debug!("End meeting: {:?} -> {:?}", self.state, next);
                    self.state = next;
                }
                Err(e) => {
                    warn!("End meeting failed in {:?}: {}", self.state, e);
                    self.state = EndMeetingState::Failed;
                    return Err(e);
                }
            }
        }
    }

    fn app(&self) -> AutomationResult<TargetApp> {
        self.app.ok_or(AutomationError::AppNotRunning)
    }

    fn locate_app(&mut self) -> AutomationResult<EndMeetingState> {
        let app = self
            .engine
            .provider()
            .target_application()
            .ok_or(AutomationError::AppNotRunning)?;
        self.app = Some(app);
        Ok(EndMeetingState::ActivatingApp)
    }

    async fn activate_app(&mut self) -> AutomationResult<EndMeetingState> {
        let app = self.app()?;
        let engine = self.engine;
        let settings = engine.settings();
        let mut attempt = ActivationAttempt::start(
            ActivationTarget::Application(app.process),
            settings.activate_timeout,
        );
        let budget = attempt.remaining();

        let active = poll_until(
            || {
                if engine.app_is_active(&app) {
                    return true;
                }
                attempt.attempt_count += 1;
                for strategy in ActivationStrategy::ALL {
                    engine.provider().activate(&app, strategy);
                    if engine.app_is_active(&app) {
                        debug!("Application active after {} activation", strategy);
                        return true;
                    }
                    trace!("Application not active after {} activation", strategy);
                }
                false
            },
            settings.poll_interval,
            budget,
        )
        .await;

        if active {
            Ok(EndMeetingState::ActivatingMeetingWindow)
        } else {
            debug!("Gave up activating {:?}", attempt);
            Err(AutomationError::Timeout {
                state: EndMeetingState::ActivatingApp,
                waited: settings.activate_timeout,
            })
        }
    }

    async fn activate_meeting_window(&mut self) -> AutomationResult<EndMeetingState> {
        let app = self.app()?;
        let engine = self.engine;
        let provider = engine.provider();
        let settings = engine.settings();

        if !engine.app_is_active(&app) {
            return Err(AutomationError::AppNotActive);
        }

        let windows = provider
            .attribute(app.element, attr::WINDOWS)
            .and_then(AttributeValue::into_elements)
            .ok_or(AutomationError::MeetingWindowNotFound)?;
        let window = self
            .find_meeting_window_by_title(&windows)
            .or_else(|| {
                debug!("No window titled like the meeting window, trying tab group");
                self.find_meeting_window_by_tab_group(&windows)
            })
            .ok_or(AutomationError::MeetingWindowNotFound)?;
        self.window = Some(window);

        let expected = provider.title(window);
        let mut attempt =
            ActivationAttempt::start(ActivationTarget::Window(window), settings.window_timeout);
        let budget = attempt.remaining();

        let focused = poll_until(
            || {
                attempt.attempt_count += 1;
                provider.raise_and_focus(&app, window);
                expected.is_some() && provider.focused_window_title() == expected
            },
            settings.poll_interval,
            budget,
        )
        .await;

        if focused {
            Ok(EndMeetingState::ClickingClose)
        } else {
            debug!("Gave up focusing {:?}", attempt);
            Err(AutomationError::Timeout {
                state: EndMeetingState::ActivatingMeetingWindow,
                waited: settings.window_timeout,
            })
        }
    }

    fn find_meeting_window_by_title(&self, windows: &[ElementHandle]) -> Option<ElementHandle> {
        let provider = self.engine.provider();
        let needle = self.engine.settings().meeting_window_title.to_lowercase();
        windows.iter().copied().find(|w| {
            provider
                .title(*w)
                .is_some_and(|t| t.to_lowercase().contains(&needle))
        })
    }

    /// The meeting window is the only one containing a tab group.
    fn find_meeting_window_by_tab_group(&self, windows: &[ElementHandle]) -> Option<ElementHandle> {
        let provider = self.engine.provider();
        windows.iter().copied().find(|w| {
            provider.children(*w).unwrap_or_default().into_iter().any(|child| {
                provider
                    .role(child)
                    .is_some_and(|r| r.to_lowercase().contains(&role::TAB_GROUP.to_lowercase()))
            })
        })
    }

    fn click_close(&mut self) -> AutomationResult<EndMeetingState> {
        let label = &self.engine.settings().labels.close;
        trace!(
            "Focused window before close: {:?}",
            self.engine.provider().focused_window_title()
        );
        // Pressing Close gives no feedback; ConfirmingEnd observes the result.
        match self.engine.find_menu_item(label) {
            Some(item) => {
                self.engine.press(item);
            }
            None => warn!("Menu item '{}' not found", label),
        }
        Ok(EndMeetingState::ConfirmingEnd)
    }

    async fn confirm_end(&mut self) -> AutomationResult<EndMeetingState> {
        let app = self.app()?;
        let engine = self.engine;
        let settings = engine.settings();
        let label = &settings.labels.end_for_all;

        let ended = poll_until(
            || {
                match engine.find_button(&app, label) {
                    Some(button) => {
                        engine.press(button);
                    }
                    None => trace!("Confirmation button not available yet"),
                }
                !engine.app_is_active(&app) || !engine.meeting_active()
            },
            settings.poll_interval,
            settings.confirm_timeout,
        )
        .await;

        if ended {
            Ok(EndMeetingState::Done)
        } else {
            Err(AutomationError::Timeout {
                state: EndMeetingState::ConfirmingEnd,
                waited: settings.confirm_timeout,
            })
        }
    }
}
