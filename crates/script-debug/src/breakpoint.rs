use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::Serialize;

/// A line breakpoint on a script resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Breakpoint {
    resource: String,
    line: u32,
    enabled: bool,
}

impl Breakpoint {
    pub fn new(resource: impl Into<String>, line: u32) -> Self {
        Self {
            resource: resource.into(),
            line,
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn hits(&self, line: u32) -> bool {
        self.enabled && self.line == line
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BreakpointAction {
    Add,
    Remove,
}

/// Breakpoints the user has set, keyed by resource.
///
/// Written from control threads, read by the dispatcher when a script becomes
/// ready so breakpoints set before the script loaded still apply.
#[derive(Debug, Default)]
pub struct BreakpointStore {
    by_resource: Mutex<BTreeMap<String, Vec<Breakpoint>>>,
}

impl BreakpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the breakpoint was already present.
    pub fn add(&self, breakpoint: Breakpoint) -> bool {
        let mut by_resource = self.by_resource.lock();
        let entries = by_resource
            .entry(breakpoint.resource().to_owned())
            .or_default();
        if entries.contains(&breakpoint) {
            return false;
        }
        entries.push(breakpoint);
        true
    }

    /// Returns `false` when the breakpoint was not present.
    pub fn remove(&self, breakpoint: &Breakpoint) -> bool {
        let mut by_resource = self.by_resource.lock();
        let Some(entries) = by_resource.get_mut(breakpoint.resource()) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry != breakpoint);
        let removed = entries.len() != before;
        if entries.is_empty() {
            by_resource.remove(breakpoint.resource());
        }
        removed
    }

    pub fn for_resource(&self, resource: &str) -> Vec<Breakpoint> {
        self.by_resource
            .lock()
            .get(resource)
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_resource.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
