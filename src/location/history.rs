//! In-memory history stack.
//!
//! The router owns one of these and updates it when a navigation commits;
//! a platform adapter (browser, native) would mirror it onto the real
//! history.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::location::path::{create_key, parse_path, Location, Path};

/// How the current history entry was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HistoryAction {
    /// Back/forward through existing entries (also the initial load).
    Pop,
    Push,
    Replace,
}

#[derive(Debug, Clone)]
pub struct MemoryHistory {
    entries: Vec<Location>,
    index: usize,
    action: HistoryAction,
}

impl MemoryHistory {
    /// Seed the stack from hrefs. The first entry keeps the key `"default"`.
    /// `initial_index` is clamped to the stack; `None` selects the last entry.
    pub fn new(initial_entries: &[String], initial_index: Option<usize>) -> Self {
        let mut entries: Vec<Location> = initial_entries
            .iter()
            .enumerate()
            .map(|(i, href)| {
                let key = if i == 0 { "default".to_string() } else { create_key() };
                let mut path = parse_path(href);
                if path.pathname.is_empty() {
                    path.pathname = "/".to_string();
                }
                Location::new(path, None, key)
            })
            .collect();
        if entries.is_empty() {
            entries.push(Location::default());
        }

        let last = entries.len() - 1;
        let index = initial_index.map_or(last, |i| i.min(last));
        Self {
            entries,
            index,
            action: HistoryAction::Pop,
        }
    }

    pub fn location(&self) -> &Location {
        &self.entries[self.index]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn action(&self) -> HistoryAction {
        self.action
    }

    /// Build a new entry for `path` without touching the stack.
    pub fn create_location(path: Path, state: Option<Value>) -> Location {
        Location::new(path, state, create_key())
    }

    /// Drop forward entries and append.
    pub fn push(&mut self, location: Location) {
        self.entries.truncate(self.index + 1);
        self.entries.push(location);
        self.index = self.entries.len() - 1;
        self.action = HistoryAction::Push;
    }

    pub fn replace(&mut self, location: Location) {
        self.entries[self.index] = location;
        self.action = HistoryAction::Replace;
    }

    /// Entry `delta` steps away, clamped to the stack, without moving.
    pub fn peek(&self, delta: isize) -> (usize, &Location) {
        let target = self.clamp(delta);
        (target, &self.entries[target])
    }

    /// Move to an absolute index returned by [`peek`](Self::peek).
    pub fn go_to(&mut self, index: usize) {
        self.index = index.min(self.entries.len() - 1);
        self.action = HistoryAction::Pop;
    }

    /// Move `delta` steps, clamped, and return the new entry.
    pub fn go(&mut self, delta: isize) -> &Location {
        let target = self.clamp(delta);
        self.go_to(target);
        self.location()
    }

    fn clamp(&self, delta: isize) -> usize {
        let last = self.entries.len() as isize - 1;
        (self.index as isize + delta).clamp(0, last) as usize
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new(&["/".to_string()], None)
    }
}
