//! UI automation provider abstraction.
//!
//! The engine never talks to a platform accessibility API directly. Every
//! lookup, attribute read and action goes through [`UiAutomationProvider`],
//! so the same retry/timeout logic runs against a native backend or the
//! in-memory [`SimulatedProvider`](super::simulated::SimulatedProvider).
//!
//! Element handles are owned by the target process. The core only compares
//! them by identity, reads from them, and asks the provider to act on them.

use std::fmt;

use super::search::{self, ElementQuery};

/// Attribute names understood by providers.
pub mod attr {
    /// Element title (text).
    pub const TITLE: &str = "title";
    /// Element role (text).
    pub const ROLE: &str = "role";
    /// Menu bar of an application element (element).
    pub const MENU_BAR: &str = "menuBar";
    /// Top-level windows of an application element (elements).
    pub const WINDOWS: &str = "windows";
    /// Focused window of an application element (element).
    pub const FOCUSED_WINDOW: &str = "focusedWindow";
}

/// Element roles the engine searches for.
pub mod role {
    /// Push button.
    pub const BUTTON: &str = "button";
    /// Menu item.
    pub const MENU_ITEM: &str = "menuItem";
    /// Top-level window.
    pub const WINDOW: &str = "window";
    /// Tab group (only the meeting window carries one).
    pub const TAB_GROUP: &str = "tabGroup";
}

/// Actions the engine performs.
pub mod action {
    /// Press / click.
    pub const PRESS: &str = "press";
}

/// Opaque, identity-comparable reference to an element of the target UI.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(u64);

impl ElementHandle {
    /// Wrap a provider-assigned identity.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The provider-assigned identity.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Element#{}", self.0)
    }
}

/// Reference to a running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessRef {
    /// OS process identifier.
    pub pid: i32,
}

/// The running target application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetApp {
    /// Process of the application.
    pub process: ProcessRef,
    /// Root application element.
    pub element: ElementHandle,
}

/// Value of an element attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    /// Text value (titles, roles).
    Text(String),
    /// Boolean value.
    Bool(bool),
    /// A single element (menu bar, focused window).
    Element(ElementHandle),
    /// A list of elements (windows).
    Elements(Vec<ElementHandle>),
}

impl AttributeValue {
    /// Borrow the text value, if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The element value, if this is a single element.
    pub fn as_element(&self) -> Option<ElementHandle> {
        match self {
            AttributeValue::Element(e) => Some(*e),
            _ => None,
        }
    }

    /// Consume into an element list, if this is a list.
    pub fn into_elements(self) -> Option<Vec<ElementHandle>> {
        match self {
            AttributeValue::Elements(list) => Some(list),
            _ => None,
        }
    }
}

/// Ways of bringing the target application to the front.
///
/// Application activation is unreliable on some platforms, so the engine
/// tries each strategy in order until the app reports frontmost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivationStrategy {
    /// Direct activation request to the running application.
    Direct,
    /// Ask the OS to (re)open the application bundle.
    Launch,
    /// Inter-process scripting fallback.
    Script,
}

impl ActivationStrategy {
    /// All strategies, in the order they are attempted.
    pub const ALL: [ActivationStrategy; 3] = [
        ActivationStrategy::Direct,
        ActivationStrategy::Launch,
        ActivationStrategy::Script,
    ];
}

impl fmt::Display for ActivationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationStrategy::Direct => write!(f, "direct"),
            ActivationStrategy::Launch => write!(f, "launch"),
            ActivationStrategy::Script => write!(f, "script"),
        }
    }
}

/// Platform UI-introspection capability consumed by the automation engine.
///
/// Implementations wrap calls into another process's accessibility tree.
/// All methods are best-effort: failures surface as `None` / `false`
/// rather than errors, because "not there right now" is an expected state
/// of a live UI.
pub trait UiAutomationProvider: Send + Sync {
    /// Locate the running target application, if any.
    fn target_application(&self) -> Option<TargetApp>;

    /// Read an attribute of an element.
    fn attribute(&self, element: ElementHandle, name: &str) -> Option<AttributeValue>;

    /// List the children of an element.
    fn children(&self, element: ElementHandle) -> Option<Vec<ElementHandle>>;

    /// Perform a named action on an element. Returns whether the provider
    /// accepted the action.
    fn perform_action(&self, element: ElementHandle, action: &str) -> bool;

    /// Raise a window and make it the application's focused window.
    fn raise_and_focus(&self, app: &TargetApp, window: ElementHandle);

    /// Whether the given process is the frontmost application.
    fn is_frontmost(&self, process: ProcessRef) -> bool;

    /// Title of the system-wide focused window.
    fn focused_window_title(&self) -> Option<String>;

    /// Request activation of the application using one strategy.
    fn activate(&self, app: &TargetApp, strategy: ActivationStrategy) -> bool;

    /// Bounded, cycle-safe depth-first search below `root`.
    fn find_element(
        &self,
        root: ElementHandle,
        query: &ElementQuery,
        max_depth: usize,
    ) -> Option<ElementHandle> {
        search::find_element(self, root, query, max_depth)
    }

    /// Title of an element, if it has one.
    fn title(&self, element: ElementHandle) -> Option<String> {
        self.attribute(element, attr::TITLE)
            .and_then(|v| v.as_text().map(str::to_owned))
    }

    /// Role of an element, if it has one.
    fn role(&self, element: ElementHandle) -> Option<String> {
        self.attribute(element, attr::ROLE)
            .and_then(|v| v.as_text().map(str::to_owned))
    }
}
