//! Discovery cache: last-known payload per service name.

use std::collections::HashMap;

/// Map from service name to its most recent discovery payload.
///
/// Snapshots iterate in first-seen order. Updating an existing name keeps
/// its position; removing a name and seeing it again moves it to the end.
#[derive(Debug, Default)]
pub struct DiscoveryCache {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl DiscoveryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last-write-wins upsert. Returns `true` if the name was not cached before.
    pub fn put(&mut self, name: impl Into<String>, payload: impl Into<String>) -> bool {
        let name = name.into();
        let payload = payload.into();
        match self.index.get(&name) {
            Some(&slot) => {
                self.entries[slot].1 = payload;
                false
            }
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name, payload));
                true
            }
        }
    }

    /// Drop a name, returning its payload if it was cached.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let slot = self.index.remove(name)?;
        let (_, payload) = self.entries.remove(slot);
        for position in self.index.values_mut() {
            if *position > slot {
                *position -= 1;
            }
        }
        Some(payload)
    }

    /// Lazy view of every `(name, payload)` pair as of this call.
    pub fn snapshot(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.entries
            .iter()
            .map(|(name, payload)| (name.as_str(), payload.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
