//! Automation engine: command verbs in, provider calls out.
//!
//! Status is never tracked separately. It is derived on every query from
//! which menu items the application currently exposes: an "Unmute audio"
//! item means audio is muted, a "Mute audio" item means it is not, and
//! neither means there is no meeting (or no application).
//!
//! The menu bar is used rather than in-window buttons because the
//! application removes hidden window controls from its element tree while
//! it is in the background.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::end_meeting::EndMeetingFlow;
use super::error::AutomationResult;
use super::provider::{
    action, attr, role, AttributeValue, ElementHandle, TargetApp, UiAutomationProvider,
};
use super::search::{self, ElementQuery};
use crate::control::protocol::{AudioStatus, CommandVerb, StatusSnapshot, VideoStatus};

/// Default interval between predicate checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default deadline for bringing the application to the front.
pub const DEFAULT_ACTIVATE_TIMEOUT: Duration = Duration::from_millis(500);

/// Default deadline for focusing the meeting window.
pub const DEFAULT_WINDOW_TIMEOUT: Duration = Duration::from_millis(500);

/// Default deadline for confirming the end of the meeting.
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_millis(300);

/// Default maximum depth for element searches.
pub const DEFAULT_MAX_SEARCH_DEPTH: usize = 55;

/// Default title of the meeting window.
pub const DEFAULT_MEETING_WINDOW_TITLE: &str = "Zoom Meeting";

/// Titles of the controls the engine looks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlLabels {
    /// Menu item shown while unmuted.
    pub mute: String,
    /// Menu item shown while muted.
    pub unmute: String,
    /// Menu item shown while video is off.
    pub start_video: String,
    /// Menu item shown while video is on.
    pub stop_video: String,
    /// Menu item that closes the focused window.
    pub close: String,
    /// Confirmation button for ending the meeting.
    pub end_for_all: String,
}

impl Default for ControlLabels {
    fn default() -> Self {
        Self {
            mute: "Mute audio".to_string(),
            unmute: "Unmute audio".to_string(),
            start_video: "Start video".to_string(),
            stop_video: "Stop video".to_string(),
            close: "Close".to_string(),
            end_for_all: "End meeting for all".to_string(),
        }
    }
}

/// Timing and lookup settings for the engine.
#[derive(Debug, Clone)]
pub struct AutomationSettings {
    /// Interval between predicate checks inside a state.
    pub poll_interval: Duration,
    /// Deadline for `ActivatingApp`.
    pub activate_timeout: Duration,
    /// Deadline for `ActivatingMeetingWindow`.
    pub window_timeout: Duration,
    /// Deadline for `ConfirmingEnd`.
    pub confirm_timeout: Duration,
    /// Maximum depth of element searches.
    pub max_search_depth: usize,
    /// Title (substring, case-insensitive) of the meeting window.
    pub meeting_window_title: String,
    /// Control titles.
    pub labels: ControlLabels,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            activate_timeout: DEFAULT_ACTIVATE_TIMEOUT,
            window_timeout: DEFAULT_WINDOW_TIMEOUT,
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
            max_search_depth: DEFAULT_MAX_SEARCH_DEPTH,
            meeting_window_title: DEFAULT_MEETING_WINDOW_TITLE.to_string(),
            labels: ControlLabels::default(),
        }
    }
}

/// Non-error result of executing a verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    /// The provider action was performed.
    Performed,
    /// The requested state already held; nothing was done.
    AlreadySatisfied,
    /// The control to act on is not currently present.
    ControlNotFound,
}

impl std::fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandOutcome::Performed => write!(f, "performed"),
            CommandOutcome::AlreadySatisfied => write!(f, "already_satisfied"),
            CommandOutcome::ControlNotFound => write!(f, "control_not_found"),
        }
    }
}

/// Executes command verbs against the target application.
///
/// Shared between the command server, the status poller and the CLI.
/// Status reads may run concurrently; command execution is serialised so
/// two automation sequences never interleave.
pub struct AutomationEngine {
    provider: Arc<dyn UiAutomationProvider>,
    settings: AutomationSettings,
    command_lock: Mutex<()>,
}

impl AutomationEngine {
    /// Create an engine over a provider.
    pub fn new(provider: Arc<dyn UiAutomationProvider>, settings: AutomationSettings) -> Self {
        Self {
            provider,
            settings,
            command_lock: Mutex::new(()),
        }
    }

    /// The engine settings.
    pub fn settings(&self) -> &AutomationSettings {
        &self.settings
    }

    pub(crate) fn provider(&self) -> &dyn UiAutomationProvider {
        self.provider.as_ref()
    }

    /// Execute a verb.
    ///
    /// Toggle verbs check the current status first and do nothing if it
    /// already matches. `EndForAll` runs the end-meeting state machine and
    /// fails with [`AutomationError::Timeout`](super::AutomationError) if a
    /// state misses its deadline.
    pub async fn execute(&self, verb: CommandVerb) -> AutomationResult<CommandOutcome> {
        let _guard = self.command_lock.lock().await;
        debug!("Executing {}", verb);

        let labels = &self.settings.labels;
        let outcome = match verb {
            CommandVerb::Mute => {
                self.ensure(self.audio_status() == AudioStatus::Muted, &labels.mute)
            }
            CommandVerb::Unmute => {
                self.ensure(self.audio_status() == AudioStatus::Unmuted, &labels.unmute)
            }
            CommandVerb::VideoOn => {
                self.ensure(self.video_status() == VideoStatus::On, &labels.start_video)
            }
            CommandVerb::VideoOff => {
                self.ensure(self.video_status() == VideoStatus::Off, &labels.stop_video)
            }
            CommandVerb::EndForAll => {
                EndMeetingFlow::new(self).run().await?;
                CommandOutcome::Performed
            }
        };

        info!("{} -> {}", verb, outcome);
        Ok(outcome)
    }

    /// Press the menu item `label` unless the desired state already holds.
    fn ensure(&self, already: bool, label: &str) -> CommandOutcome {
        if already {
            return CommandOutcome::AlreadySatisfied;
        }
        match self.find_menu_item(label) {
            Some(item) => {
                self.press(item);
                CommandOutcome::Performed
            }
            None => {
                warn!("Menu item '{}' not found", label);
                CommandOutcome::ControlNotFound
            }
        }
    }

    /// Current audio status.
    pub fn audio_status(&self) -> AudioStatus {
        let labels = &self.settings.labels;
        if self.find_menu_item(&labels.unmute).is_some() {
            AudioStatus::Muted
        } else if self.find_menu_item(&labels.mute).is_some() {
            AudioStatus::Unmuted
        } else {
            AudioStatus::Unknown
        }
    }

    /// Current video status.
    pub fn video_status(&self) -> VideoStatus {
        let labels = &self.settings.labels;
        if self.find_menu_item(&labels.stop_video).is_some() {
            VideoStatus::On
        } else if self.find_menu_item(&labels.start_video).is_some() {
            VideoStatus::Off
        } else {
            VideoStatus::Unknown
        }
    }

    /// Whether a meeting is in progress (audio controls are present).
    pub fn meeting_active(&self) -> bool {
        self.audio_status() != AudioStatus::Unknown
    }

    /// Sample all status fields.
    pub fn snapshot(&self) -> StatusSnapshot {
        let audio_status = self.audio_status();
        StatusSnapshot {
            audio_status,
            video_status: self.video_status(),
            meeting_active: audio_status != AudioStatus::Unknown,
        }
    }

    /// Locate a menu item by title under the application's menu bar.
    pub(crate) fn find_menu_item(&self, title: &str) -> Option<ElementHandle> {
        let app = self.provider.target_application()?;
        let menu_bar = self
            .provider
            .attribute(app.element, attr::MENU_BAR)
            .and_then(|v| v.as_element());
        let Some(menu_bar) = menu_bar else {
            debug!("Application exposes no menu bar");
            return None;
        };
        search::find_element(
            self.provider(),
            menu_bar,
            &ElementQuery::titled(title),
            self.settings.max_search_depth,
        )
    }

    /// Locate a button by title anywhere below the application element.
    pub(crate) fn find_button(&self, app: &TargetApp, title: &str) -> Option<ElementHandle> {
        search::find_element(
            self.provider(),
            app.element,
            &ElementQuery::with_role(role::BUTTON, title),
            self.settings.max_search_depth,
        )
    }

    /// The application is frontmost and has a focused window.
    pub(crate) fn app_is_active(&self, app: &TargetApp) -> bool {
        self.provider.is_frontmost(app.process)
            && self
                .provider
                .attribute(app.element, attr::FOCUSED_WINDOW)
                .is_some_and(|v| matches!(v, AttributeValue::Element(_)))
    }

    /// Press an element, logging a refusal.
    pub(crate) fn press(&self, element: ElementHandle) -> bool {
        let title = self.provider.title(element);
        debug!("Pressing {:?} ({:?})", element, title);
        let ok = self.provider.perform_action(element, action::PRESS);
        if !ok {
            warn!("Provider refused press on {:?} ({:?})", element, title);
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::simulated::SimulatedProvider;

    fn engine_with(sim: Arc<SimulatedProvider>) -> AutomationEngine {
        AutomationEngine::new(sim, AutomationSettings::default())
    }

    fn meeting() -> Arc<SimulatedProvider> {
        Arc::new(SimulatedProvider::meeting(
            &ControlLabels::default(),
            DEFAULT_MEETING_WINDOW_TITLE,
        ))
    }

    #[test]
    fn test_status_from_menu_items() {
        let sim = meeting();
        let engine = engine_with(sim.clone());

        assert_eq!(
            engine.snapshot(),
            StatusSnapshot {
                audio_status: AudioStatus::Unmuted,
                video_status: VideoStatus::On,
                meeting_active: true,
            }
        );

        let audio = sim.find_by_title("Mute audio").unwrap();
        sim.set_title(audio, "Unmute audio");
        assert_eq!(engine.audio_status(), AudioStatus::Muted);

        let video = sim.find_by_title("Stop video").unwrap();
        sim.set_title(video, "Start video");
        assert_eq!(engine.video_status(), VideoStatus::Off);
    }

    #[test]
    fn test_status_unknown_without_app() {
        let sim = Arc::new(SimulatedProvider::new());
        let engine = engine_with(sim);
        assert_eq!(engine.snapshot(), StatusSnapshot::default());
        assert!(!engine.meeting_active());
    }

    #[tokio::test]
    async fn test_mute_when_muted_performs_no_action() {
        let sim = meeting();
        let audio = sim.find_by_title("Mute audio").unwrap();
        sim.set_title(audio, "Unmute audio");
        let engine = engine_with(sim.clone());

        let outcome = engine.execute(CommandVerb::Mute).await.unwrap();
        assert_eq!(outcome, CommandOutcome::AlreadySatisfied);
        assert_eq!(sim.action_count(), 0);
    }

    #[tokio::test]
    async fn test_mute_when_unmuted_performs_one_action() {
        let sim = meeting();
        let engine = engine_with(sim.clone());

        let outcome = engine.execute(CommandVerb::Mute).await.unwrap();
        assert_eq!(outcome, CommandOutcome::Performed);
        assert_eq!(sim.action_count(), 1);
        assert_eq!(engine.audio_status(), AudioStatus::Muted);

        // Second mute is a no-op.
        engine.execute(CommandVerb::Mute).await.unwrap();
        assert_eq!(sim.action_count(), 1);
    }

    #[tokio::test]
    async fn test_unmute_and_video_toggles() {
        let sim = meeting();
        let engine = engine_with(sim.clone());

        assert_eq!(
            engine.execute(CommandVerb::Unmute).await.unwrap(),
            CommandOutcome::AlreadySatisfied
        );
        assert_eq!(
            engine.execute(CommandVerb::VideoOff).await.unwrap(),
            CommandOutcome::Performed
        );
        assert_eq!(engine.video_status(), VideoStatus::Off);
        assert_eq!(
            engine.execute(CommandVerb::VideoOn).await.unwrap(),
            CommandOutcome::Performed
        );
        assert_eq!(engine.video_status(), VideoStatus::On);
        assert_eq!(sim.action_count(), 2);
    }

    #[tokio::test]
    async fn test_toggle_without_meeting_reports_control_not_found() {
        let sim = Arc::new(SimulatedProvider::new());
        let engine = engine_with(sim.clone());

        let outcome = engine.execute(CommandVerb::Mute).await.unwrap();
        assert_eq!(outcome, CommandOutcome::ControlNotFound);
        assert_eq!(sim.action_count(), 0);
    }

    #[test]
    fn test_custom_labels() {
        let labels = ControlLabels {
            mute: "Stummschalten".to_string(),
            unmute: "Stummschaltung aufheben".to_string(),
            ..ControlLabels::default()
        };
        let sim = Arc::new(SimulatedProvider::meeting(&labels, "Zoom-Meeting"));
        let settings = AutomationSettings {
            labels,
            ..AutomationSettings::default()
        };
        let engine = AutomationEngine::new(sim, settings);
        assert_eq!(engine.audio_status(), AudioStatus::Unmuted);
    }
}
