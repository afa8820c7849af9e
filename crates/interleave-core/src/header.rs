//! Ordered string key/value store for run headers.
//!
//! Filled from the `headers` section of the configuration before the run
//! and read by hook policies.

use std::collections::BTreeMap;

use serde::Serialize;

/// Header key/value pairs, iterated in key order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HeaderStore {
    entries: BTreeMap<String, String>,
}

impl HeaderStore {
    /// An empty store.
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// All keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Insert or replace a value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<BTreeMap<String, String>> for HeaderStore {
    fn from(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_come_back_sorted() {
        let mut headers = HeaderStore::new();
        headers.set("zeta", "1");
        headers.set("alpha", "2");
        headers.set("alpha", "3");
        assert_eq!(headers.keys().collect::<Vec<_>>(), vec!["alpha", "zeta"]);
        assert_eq!(headers.get("alpha"), Some("3"));
        assert_eq!(headers.get("missing"), None);
        assert_eq!(headers.len(), 2);
    }
}
