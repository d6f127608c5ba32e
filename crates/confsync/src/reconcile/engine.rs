//! Item-level state and the diff that keeps it in line with validated files.

use std::collections::{BTreeMap, HashSet};

use super::action::{Action, ConfigSet, Reassignment, Reconciliation};

/// Authoritative item state, keyed by identity.
///
/// `T` must implement structural equality: `PartialEq` decides whether an
/// item re-observed under the same identity counts as changed.
#[derive(Debug, Clone)]
pub struct Reconciler<T> {
    state: BTreeMap<String, ConfigSet<T>>,
}

impl<T> Default for Reconciler<T> {
    fn default() -> Self {
        Self {
            state: BTreeMap::new(),
        }
    }
}

impl<T: Clone + PartialEq> Reconciler<T> {
    /// Creates an empty reconciler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies the full, validated item list of `filename`.
    ///
    /// Identities previously filed under `filename` that are absent from
    /// `items` are removed first; the list is then walked in order, emitting
    /// add, update or moved as needed.
    pub fn apply_file(&mut self, filename: &str, items: Vec<(String, T)>) -> Reconciliation<T> {
        let mut outcome = Reconciliation::default();

        let incoming: HashSet<&str> = items.iter().map(|(id, _)| id.as_str()).collect();
        let vanished: Vec<String> = self
            .state
            .iter()
            .filter(|(id, set)| set.filename == filename && !incoming.contains(id.as_str()))
            .map(|(id, _)| id.clone())
            .collect();

        for id in vanished {
            self.state.remove(&id);
            outcome.actions.push(Action::Remove { id });
        }

        let mut seen: HashSet<String> = HashSet::new();
        for (id, item) in items {
            if !seen.insert(id.clone()) {
                log::warn!("'{}' declares '{}' more than once; the last one wins", filename, id);
            }

            match self.state.get_mut(&id) {
                None => {
                    let set = ConfigSet::new(filename, item);
                    self.state.insert(id.clone(), set.clone());
                    outcome.actions.push(Action::Add { id, set });
                }
                Some(current) => {
                    let changed = current.item != item;
                    let relocated = current.filename != filename;

                    if relocated {
                        outcome.reassignments.push(Reassignment {
                            id: id.clone(),
                            previous_filename: current.filename.clone(),
                            filename: filename.to_string(),
                        });
                    }

                    if changed {
                        *current = ConfigSet::new(filename, item);
                        let set = current.clone();
                        outcome.actions.push(Action::Update { id, set });
                    } else if relocated {
                        current.filename = filename.to_string();
                        let set = current.clone();
                        outcome.actions.push(Action::Moved { id, set });
                    }
                }
            }
        }

        outcome
    }

    /// Removes every identity currently filed under `filename`.
    ///
    /// Identities that have since moved to another file are left alone.
    pub fn remove_file(&mut self, filename: &str) -> Reconciliation<T> {
        let mut outcome = Reconciliation::default();

        let tracked: Vec<String> = self
            .state
            .iter()
            .filter(|(_, set)| set.filename == filename)
            .map(|(id, _)| id.clone())
            .collect();

        for id in tracked {
            self.state.remove(&id);
            outcome.actions.push(Action::Remove { id });
        }

        outcome
    }

    /// Returns the current state entry for an identity.
    pub fn get(&self, id: &str) -> Option<&ConfigSet<T>> {
        self.state.get(id)
    }

    /// Returns a borrowed view of the full state.
    pub fn state(&self) -> &BTreeMap<String, ConfigSet<T>> {
        &self.state
    }

    /// Returns an owned copy of the full state.
    pub fn snapshot(&self) -> BTreeMap<String, ConfigSet<T>> {
        self.state.clone()
    }

    /// Identities currently filed under `filename`, in identity order.
    pub fn ids_in(&self, filename: &str) -> Vec<&str> {
        self.state
            .iter()
            .filter(|(_, set)| set.filename == filename)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Discards all state.
    pub fn clear(&mut self) {
        self.state.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================
