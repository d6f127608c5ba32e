//! Item-level actions produced by reconciliation.

use serde::Serialize;

/// The file an item currently belongs to, and its current value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSet<T> {
    /// Source filename, relative to its driver's root.
    pub filename: String,
    /// The validated item.
    pub item: T,
}

impl<T> ConfigSet<T> {
    /// Creates a new config set.
    pub fn new(filename: impl Into<String>, item: T) -> Self {
        Self {
            filename: filename.into(),
            item,
        }
    }
}

/// A single committed change to the item state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action<T> {
    /// Identity newly observed.
    Add { id: String, set: ConfigSet<T> },
    /// Identity already tracked, value changed.
    Update { id: String, set: ConfigSet<T> },
    /// Identity already tracked, value unchanged, filename changed.
    Moved { id: String, set: ConfigSet<T> },
    /// Identity no longer present in its tracked file.
    Remove { id: String },
}

impl<T> Action<T> {
    /// Returns the identity this action refers to.
    pub fn id(&self) -> &str {
        match self {
            Action::Add { id, .. }
            | Action::Update { id, .. }
            | Action::Moved { id, .. }
            | Action::Remove { id } => id,
        }
    }

    /// Returns the new config set, or `None` for removals.
    pub fn config_set(&self) -> Option<&ConfigSet<T>> {
        match self {
            Action::Add { set, .. } | Action::Update { set, .. } | Action::Moved { set, .. } => {
                Some(set)
            }
            Action::Remove { .. } => None,
        }
    }

    /// Short lowercase name of the action kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Add { .. } => "add",
            Action::Update { .. } => "update",
            Action::Moved { .. } => "moved",
            Action::Remove { .. } => "remove",
        }
    }
}

/// An identity that a file claimed while it was tracked under another file.
///
/// This is either a deliberate relocation or two files defining the same
/// identity; the engine cannot tell which, so it reports every occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reassignment {
    pub id: String,
    pub previous_filename: String,
    pub filename: String,
}

/// Everything a single file event produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation<T> {
    /// Actions in commit order.
    pub actions: Vec<Action<T>>,
    /// Cross-file identity claims observed while processing the event.
    pub reassignments: Vec<Reassignment>,
}

impl<T> Default for Reconciliation<T> {
    fn default() -> Self {
        Self {
            actions: Vec::new(),
            reassignments: Vec::new(),
        }
    }
}

impl<T> Reconciliation<T> {
    /// Returns true if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
