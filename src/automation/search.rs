//! Bounded, cycle-safe element search.
//!
//! The element graph belongs to another process. It can contain cycles and
//! can change while we walk it, so every traversal carries an explicit
//! depth bound and a visited set. The visited set lives for exactly one
//! top-level call and is threaded through the recursion as a parameter.

use std::collections::HashSet;

use tracing::trace;

use super::provider::{ElementHandle, UiAutomationProvider};

/// Indentation limit for the diagnostic tree dump.
const DUMP_MAX_DEPTH: usize = 25;

/// Predicate for an element search: exact title, optionally constrained by role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementQuery {
    /// Required role, or `None` to accept any role.
    pub role: Option<String>,
    /// Required title (exact match).
    pub title: String,
}

impl ElementQuery {
    /// Match any element with this title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            role: None,
            title: title.into(),
        }
    }

    /// Match elements with this role and title.
    pub fn with_role(role: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            title: title.into(),
        }
    }

    /// Evaluate the predicate against an element.
    pub fn matches<P>(&self, provider: &P, element: ElementHandle) -> bool
    where
        P: UiAutomationProvider + ?Sized,
    {
        if let Some(ref role) = self.role
            && provider.role(element).as_deref() != Some(role.as_str())
        {
            return false;
        }
        provider.title(element).as_deref() == Some(self.title.as_str())
    }
}

/// Search below `root` for the first element matching `query`.
///
/// Depth-first, at most `max_depth` levels below the root. Children that
/// were already visited in this search are skipped: that is a cycle (or a
/// shared subtree) and re-descending it cannot find anything new.
///
/// Returns `None` when nothing matches; absence is a normal outcome.
pub fn find_element<P>(
    provider: &P,
    root: ElementHandle,
    query: &ElementQuery,
    max_depth: usize,
) -> Option<ElementHandle>
where
    P: UiAutomationProvider + ?Sized,
{
    let mut visited = HashSet::new();
    visited.insert(root);
    let found = search(provider, root, query, max_depth, &mut visited);
    if found.is_none() {
        trace!(
            "No element matching {:?} below {:?} ({} visited)",
            query,
            root,
            visited.len()
        );
    }
    found
}

fn search<P>(
    provider: &P,
    element: ElementHandle,
    query: &ElementQuery,
    depth_left: usize,
    visited: &mut HashSet<ElementHandle>,
) -> Option<ElementHandle>
where
    P: UiAutomationProvider + ?Sized,
{
    if query.matches(provider, element) {
        return Some(element);
    }

    if depth_left == 0 {
        trace!("Search depth exhausted at {:?}", element);
        dump_tree(provider, element);
        return None;
    }

    let children = provider.children(element)?;
    for child in children {
        if !visited.insert(child) {
            trace!("Cycle detected at {:?}, skipping branch", child);
            continue;
        }
        if let Some(found) = search(provider, child, query, depth_left - 1, visited) {
            return Some(found);
        }
    }

    None
}

/// Emit the subtree below `root` at trace level.
///
/// Bounded by depth and by its own visited set, so it terminates on cyclic
/// graphs too.
pub fn dump_tree<P>(provider: &P, root: ElementHandle)
where
    P: UiAutomationProvider + ?Sized,
{
    if !tracing::enabled!(tracing::Level::TRACE) {
        return;
    }
    let mut visited = HashSet::new();
    visited.insert(root);
    dump_node(provider, root, 0, &mut visited);
}

fn dump_node<P>(
    provider: &P,
    element: ElementHandle,
    indent: usize,
    visited: &mut HashSet<ElementHandle>,
) where
    P: UiAutomationProvider + ?Sized,
{
    if indent >= DUMP_MAX_DEPTH {
        trace!("{}...", "  ".repeat(indent));
        return;
    }
    let title = provider
        .title(element)
        .unwrap_or_else(|| "<no title>".to_string());
    trace!("{}- {}", "  ".repeat(indent), title);

    for child in provider.children(element).unwrap_or_default() {
        if visited.insert(child) {
            dump_node(provider, child, indent + 1, visited);
        }
    }
}
