//! Last-known raw content per file, used to collapse raw events into real changes.

use std::collections::BTreeMap;

use super::ConfigFileChange;

/// Per-driver cache of `filename -> raw content`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSnapshot {
    files: BTreeMap<String, String>,
}

impl FileSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the current content of one file (`None` = file is gone) and
    /// returns the change this amounts to, if any.
    pub fn observe(&mut self, filename: &str, content: Option<String>) -> Option<ConfigFileChange> {
        match content {
            Some(content) => match self.files.get(filename) {
                Some(previous) if *previous == content => None,
                Some(_) => {
                    self.files.insert(filename.to_string(), content.clone());
                    Some(ConfigFileChange::update(filename, content))
                }
                None => {
                    self.files.insert(filename.to_string(), content.clone());
                    Some(ConfigFileChange::add(filename, content))
                }
            },
            None => self
                .files
                .remove(filename)
                .map(|_| ConfigFileChange::remove(filename)),
        }
    }

    /// Diffs a complete new snapshot against the cached one.
    ///
    /// Removals come first, then additions and updates, each in filename order.
    pub fn replace_all(&mut self, next: BTreeMap<String, String>) -> Vec<ConfigFileChange> {
        let mut changes: Vec<ConfigFileChange> = self
            .files
            .keys()
            .filter(|name| !next.contains_key(*name))
            .map(ConfigFileChange::remove)
            .collect();

        for (name, content) in &next {
            match self.files.get(name) {
                Some(previous) if previous == content => {}
                Some(_) => changes.push(ConfigFileChange::update(name, content)),
                None => changes.push(ConfigFileChange::add(name, content)),
            }
        }

        self.files = next;
        changes
    }

    /// Forgets every file and returns one removal per file.
    pub fn clear(&mut self) -> Vec<ConfigFileChange> {
        std::mem::take(&mut self.files)
            .into_keys()
            .map(ConfigFileChange::remove)
            .collect()
    }

    /// Forgets every file below directory `prefix` (a `/` separated relative path).
    pub fn forget_prefix(&mut self, prefix: &str) -> Vec<ConfigFileChange> {
        let dir = format!("{}/", prefix.trim_end_matches('/'));
        let doomed: Vec<String> = self
            .files
            .keys()
            .filter(|name| name.starts_with(&dir))
            .cloned()
            .collect();

        doomed
            .into_iter()
            .filter_map(|name| self.observe(&name, None))
            .collect()
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.files.contains_key(filename)
    }

    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
