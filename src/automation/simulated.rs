//! In-memory UI automation provider.
//!
//! Models the target application as a graph of elements with titles, roles
//! and children. Pressing an element runs a list of [`Effect`]s so the graph
//! reacts the way the real application does: the audio menu item flips
//! between "Mute audio" and "Unmute audio", closing the meeting window
//! reveals a confirmation button, confirming removes the meeting.
//!
//! Used by the test suite and by `--simulate` mode of the binary. Every
//! call is counted so tests can assert exactly how many provider actions a
//! command performed.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::engine::ControlLabels;
use super::provider::{
    action, attr, role, ActivationStrategy, AttributeValue, ElementHandle, ProcessRef, TargetApp,
    UiAutomationProvider,
};

/// Process id used by the built-in meeting fixture.
pub const SIMULATED_PID: i32 = 4242;

/// A change applied to the graph when an element is pressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Swap the element's title between two values.
    ToggleTitle {
        /// One title.
        a: String,
        /// The other title.
        b: String,
    },
    /// Attach `child` under `parent`.
    AttachChild {
        /// New parent.
        parent: ElementHandle,
        /// Element to attach.
        child: ElementHandle,
    },
    /// Remove `child` from `parent`'s children.
    DetachChild {
        /// Current parent.
        parent: ElementHandle,
        /// Element to detach.
        child: ElementHandle,
    },
    /// Change which window of the application has focus.
    FocusWindow(Option<ElementHandle>),
    /// Change whether the application is frontmost.
    SetFrontmost(bool),
}

#[derive(Debug, Default)]
struct Node {
    role: String,
    title: String,
    children: Vec<ElementHandle>,
    attributes: HashMap<String, AttributeValue>,
    on_press: Vec<Effect>,
}

#[derive(Debug)]
struct SimState {
    next_id: u64,
    nodes: HashMap<ElementHandle, Node>,
    app: Option<TargetApp>,
    frontmost: bool,
    focused_window: Option<ElementHandle>,
    /// Strategies that actually bring the app to the front.
    effective_strategies: HashSet<ActivationStrategy>,
    /// Whether `raise_and_focus` changes the focused window.
    focus_follows_raise: bool,
    actions: Vec<(ElementHandle, String)>,
    activations: Vec<ActivationStrategy>,
}

/// An in-memory element graph implementing [`UiAutomationProvider`].
pub struct SimulatedProvider {
    state: Mutex<SimState>,
    children_calls: AtomicUsize,
}

impl SimulatedProvider {
    /// Create an empty graph with no running application.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                next_id: 1,
                nodes: HashMap::new(),
                app: None,
                frontmost: false,
                focused_window: None,
                effective_strategies: ActivationStrategy::ALL.into_iter().collect(),
                focus_follows_raise: true,
                actions: Vec::new(),
                activations: Vec::new(),
            }),
            children_calls: AtomicUsize::new(0),
        }
    }

    /// A running conferencing application in an active meeting.
    ///
    /// Audio is unmuted and video is on. The application starts in the
    /// background with its home window focused, so ending the meeting has
    /// to activate it and raise the meeting window first.
    #[must_use]
    pub fn meeting(labels: &ControlLabels, meeting_title: &str) -> Self {
        let sim = Self::new();
        let app = sim.launch_app(SIMULATED_PID, "zoom.us");

        let menu_bar = sim.add_element("menuBar", "");
        sim.set_attribute(app.element, attr::MENU_BAR, AttributeValue::Element(menu_bar));

        let file_menu = sim.add_child(menu_bar, "menuBarItem", "zoom.us");
        let close = sim.add_child(file_menu, role::MENU_ITEM, &labels.close);

        let meeting_menu = sim.add_child(menu_bar, "menuBarItem", "Meeting");
        let audio = sim.add_child(meeting_menu, role::MENU_ITEM, &labels.mute);
        let video = sim.add_child(meeting_menu, role::MENU_ITEM, &labels.stop_video);
        sim.on_press(
            audio,
            Effect::ToggleTitle {
                a: labels.mute.clone(),
                b: labels.unmute.clone(),
            },
        );
        sim.on_press(
            video,
            Effect::ToggleTitle {
                a: labels.stop_video.clone(),
                b: labels.start_video.clone(),
            },
        );

        let home = sim.add_child(app.element, role::WINDOW, "Zoom Workplace");
        let meeting = sim.add_child(app.element, role::WINDOW, meeting_title);
        sim.add_child(meeting, role::TAB_GROUP, "");
        sim.focus_window(Some(home));

        // Confirmation only appears after Close is pressed on the meeting window.
        let confirm = sim.add_element(role::BUTTON, &labels.end_for_all);
        sim.on_press(
            close,
            Effect::AttachChild {
                parent: meeting,
                child: confirm,
            },
        );
        for effect in [
            Effect::DetachChild {
                parent: app.element,
                child: meeting,
            },
            Effect::DetachChild {
                parent: meeting_menu,
                child: audio,
            },
            Effect::DetachChild {
                parent: meeting_menu,
                child: video,
            },
            Effect::FocusWindow(Some(home)),
        ] {
            sim.on_press(confirm, effect);
        }

        sim
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a detached element.
    pub fn add_element(&self, role: &str, title: &str) -> ElementHandle {
        let mut state = self.state();
        let handle = ElementHandle::new(state.next_id);
        state.next_id += 1;
        state.nodes.insert(
            handle,
            Node {
                role: role.to_string(),
                title: title.to_string(),
                ..Default::default()
            },
        );
        handle
    }

    /// Create an element as the last child of `parent`.
    pub fn add_child(&self, parent: ElementHandle, role: &str, title: &str) -> ElementHandle {
        let child = self.add_element(role, title);
        self.link_child(parent, child);
        child
    }

    /// Add an existing element as a child of `parent` (may create cycles).
    pub fn link_child(&self, parent: ElementHandle, child: ElementHandle) {
        if let Some(node) = self.state().nodes.get_mut(&parent) {
            node.children.push(child);
        }
    }

    /// Register a running application with a fresh root element.
    pub fn launch_app(&self, pid: i32, name: &str) -> TargetApp {
        let element = self.add_element("application", name);
        let app = TargetApp {
            process: ProcessRef { pid },
            element,
        };
        self.state().app = Some(app);
        app
    }

    /// Remove the running application.
    pub fn quit_app(&self) {
        let mut state = self.state();
        state.app = None;
        state.frontmost = false;
    }

    /// Set an explicit attribute on an element.
    pub fn set_attribute(&self, element: ElementHandle, name: &str, value: AttributeValue) {
        if let Some(node) = self.state().nodes.get_mut(&element) {
            node.attributes.insert(name.to_string(), value);
        }
    }

    /// Change an element's title.
    pub fn set_title(&self, element: ElementHandle, title: &str) {
        if let Some(node) = self.state().nodes.get_mut(&element) {
            node.title = title.to_string();
        }
    }

    /// Append an effect run when `element` is pressed.
    pub fn on_press(&self, element: ElementHandle, effect: Effect) {
        if let Some(node) = self.state().nodes.get_mut(&element) {
            node.on_press.push(effect);
        }
    }

    /// Set whether the application is frontmost.
    pub fn set_frontmost(&self, frontmost: bool) {
        self.state().frontmost = frontmost;
    }

    /// Set the application's focused window.
    pub fn focus_window(&self, window: Option<ElementHandle>) {
        self.state().focused_window = window;
    }

    /// Restrict which activation strategies bring the app to the front.
    pub fn set_effective_strategies(&self, strategies: &[ActivationStrategy]) {
        self.state().effective_strategies = strategies.iter().copied().collect();
    }

    /// Set whether raising a window also focuses it.
    pub fn set_focus_follows_raise(&self, follows: bool) {
        self.state().focus_follows_raise = follows;
    }

    /// First element (attached or not) with this title.
    pub fn find_by_title(&self, title: &str) -> Option<ElementHandle> {
        let state = self.state();
        let mut matches: Vec<_> = state
            .nodes
            .iter()
            .filter(|(_, node)| node.title == title)
            .map(|(handle, _)| *handle)
            .collect();
        matches.sort_by_key(|h| h.raw());
        matches.first().copied()
    }

    /// Every action performed so far, in order.
    pub fn actions(&self) -> Vec<(ElementHandle, String)> {
        self.state().actions.clone()
    }

    /// Number of actions performed so far.
    pub fn action_count(&self) -> usize {
        self.state().actions.len()
    }

    /// Activation strategies requested so far, in order.
    pub fn activations(&self) -> Vec<ActivationStrategy> {
        self.state().activations.clone()
    }

    /// Number of `children` calls served.
    pub fn children_calls(&self) -> usize {
        self.children_calls.load(Ordering::Relaxed)
    }

    fn apply(state: &mut SimState, target: ElementHandle, effect: Effect) {
        match effect {
            Effect::ToggleTitle { a, b } => {
                if let Some(node) = state.nodes.get_mut(&target) {
                    node.title = if node.title == a { b } else { a };
                }
            }
            Effect::AttachChild { parent, child } => {
                if let Some(node) = state.nodes.get_mut(&parent)
                    && !node.children.contains(&child)
                {
                    node.children.push(child);
                }
            }
            Effect::DetachChild { parent, child } => {
                if let Some(node) = state.nodes.get_mut(&parent) {
                    node.children.retain(|c| *c != child);
                }
                if state.focused_window == Some(child) {
                    state.focused_window = None;
                }
            }
            Effect::FocusWindow(window) => state.focused_window = window,
            Effect::SetFrontmost(frontmost) => state.frontmost = frontmost,
        }
    }

    fn windows_of(state: &SimState, app_element: ElementHandle) -> Vec<ElementHandle> {
        state
            .nodes
            .get(&app_element)
            .map(|node| {
                node.children
                    .iter()
                    .copied()
                    .filter(|c| {
                        state
                            .nodes
                            .get(c)
                            .is_some_and(|n| n.role == role::WINDOW)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl UiAutomationProvider for SimulatedProvider {
    fn target_application(&self) -> Option<TargetApp> {
        self.state().app
    }

    fn attribute(&self, element: ElementHandle, name: &str) -> Option<AttributeValue> {
        let state = self.state();
        let node = state.nodes.get(&element)?;
        let is_app = state.app.is_some_and(|app| app.element == element);

        match name {
            attr::TITLE if !node.title.is_empty() => Some(AttributeValue::Text(node.title.clone())),
            attr::ROLE => Some(AttributeValue::Text(node.role.clone())),
            attr::WINDOWS if is_app => Some(AttributeValue::Elements(Self::windows_of(
                &state, element,
            ))),
            attr::FOCUSED_WINDOW if is_app => state.focused_window.map(AttributeValue::Element),
            _ => node.attributes.get(name).cloned(),
        }
    }

    fn children(&self, element: ElementHandle) -> Option<Vec<ElementHandle>> {
        self.children_calls.fetch_add(1, Ordering::Relaxed);
        self.state().nodes.get(&element).map(|n| n.children.clone())
    }

    fn perform_action(&self, element: ElementHandle, action_name: &str) -> bool {
        let mut state = self.state();
        state.actions.push((element, action_name.to_string()));

        let Some(node) = state.nodes.get(&element) else {
            return false;
        };
        if action_name != action::PRESS {
            return false;
        }

        debug!("Simulated press on {:?} ({})", element, node.title);
        let effects = node.on_press.clone();
        for effect in effects {
            Self::apply(&mut state, element, effect);
        }
        true
    }

    fn raise_and_focus(&self, app: &TargetApp, window: ElementHandle) {
        let mut state = self.state();
        if state.focus_follows_raise && Self::windows_of(&state, app.element).contains(&window) {
            state.focused_window = Some(window);
        }
    }

    fn is_frontmost(&self, process: ProcessRef) -> bool {
        let state = self.state();
        state.frontmost && state.app.is_some_and(|app| app.process == process)
    }

    fn focused_window_title(&self) -> Option<String> {
        let state = self.state();
        if !state.frontmost {
            return None;
        }
        let window = state.focused_window?;
        state
            .nodes
            .get(&window)
            .map(|n| n.title.clone())
            .filter(|t| !t.is_empty())
    }

    fn activate(&self, app: &TargetApp, strategy: ActivationStrategy) -> bool {
        let mut state = self.state();
        state.activations.push(strategy);
        if state.app.map(|a| a.process) != Some(app.process) {
            return false;
        }
        if state.effective_strategies.contains(&strategy) {
            state.frontmost = true;
            if state.focused_window.is_none() {
                state.focused_window = Self::windows_of(&state, app.element).first().copied();
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meeting_fixture_shape() {
        let labels = ControlLabels::default();
        let sim = SimulatedProvider::meeting(&labels, "Zoom Meeting");

        let app = sim.target_application().unwrap();
        assert_eq!(app.process.pid, SIMULATED_PID);
        assert!(!sim.is_frontmost(app.process));

        let windows = sim
            .attribute(app.element, attr::WINDOWS)
            .and_then(AttributeValue::into_elements)
            .unwrap();
        assert_eq!(windows.len(), 2);
        assert!(sim.find_by_title("Mute audio").is_some());
        assert!(sim.find_by_title("Stop video").is_some());
    }

    #[test]
    fn test_press_toggles_title() {
        let labels = ControlLabels::default();
        let sim = SimulatedProvider::meeting(&labels, "Zoom Meeting");
        let audio = sim.find_by_title("Mute audio").unwrap();

        assert!(sim.perform_action(audio, action::PRESS));
        assert_eq!(sim.title(audio).as_deref(), Some("Unmute audio"));
        assert!(sim.perform_action(audio, action::PRESS));
        assert_eq!(sim.title(audio).as_deref(), Some("Mute audio"));
        assert_eq!(sim.action_count(), 2);
    }

    #[test]
    fn test_activation_respects_effective_strategies() {
        let labels = ControlLabels::default();
        let sim = SimulatedProvider::meeting(&labels, "Zoom Meeting");
        let app = sim.target_application().unwrap();
        sim.set_effective_strategies(&[ActivationStrategy::Script]);

        sim.activate(&app, ActivationStrategy::Direct);
        assert!(!sim.is_frontmost(app.process));
        sim.activate(&app, ActivationStrategy::Script);
        assert!(sim.is_frontmost(app.process));
        assert_eq!(
            sim.activations(),
            vec![ActivationStrategy::Direct, ActivationStrategy::Script]
        );
    }

    #[test]
    fn test_focused_window_title_requires_frontmost() {
        let labels = ControlLabels::default();
        let sim = SimulatedProvider::meeting(&labels, "Zoom Meeting");
        assert_eq!(sim.focused_window_title(), None);

        sim.set_frontmost(true);
        assert_eq!(sim.focused_window_title().as_deref(), Some("Zoom Workplace"));
    }

    #[test]
    fn test_unknown_element_action_fails() {
        let sim = SimulatedProvider::new();
        assert!(!sim.perform_action(ElementHandle::new(99), action::PRESS));
        assert_eq!(sim.children(ElementHandle::new(99)), None);
    }
}
