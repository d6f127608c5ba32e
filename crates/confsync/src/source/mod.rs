//! Configuration sources.
//!
//! A source driver watches some external store (a directory tree, a
//! Kubernetes ConfigMap, ...) and reports whole-file changes:
//! - changes are already debounced and collapsed, unchanged content is never reported
//! - transient connectivity problems are retried inside the driver
//! - only a terminal failure ends a driver

pub mod channel;
pub mod file;
pub mod kube;
pub mod resource;
pub mod snapshot;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use crate::error::{Result, SyncError};

pub use channel::{ChangeSender, ChannelSourceDriver};
pub use file::FileSourceDriver;
pub use kube::{ConfigMapClient, ManifestClient};
pub use resource::{ResourceClient, ResourceSourceDriver};
pub use snapshot::FileSnapshot;

/// The type of a whole-file change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// A file appeared.
    Add,
    /// A known file's content changed.
    Update,
    /// A known file disappeared.
    Remove,
}

/// A whole-file change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFileChange {
    pub kind: ChangeKind,
    pub filename: String,
    /// Full new content; `None` exactly when `kind` is `Remove`.
    pub content: Option<String>,
}

impl ConfigFileChange {
    pub fn add(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Add,
            filename: filename.into(),
            content: Some(content.into()),
        }
    }

    pub fn update(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Update,
            filename: filename.into(),
            content: Some(content.into()),
        }
    }

    pub fn remove(filename: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Remove,
            filename: filename.into(),
            content: None,
        }
    }
}

/// What a driver pushes into the engine's queue.
#[derive(Debug)]
pub enum SourceEvent {
    /// A file changed.
    Change {
        source: String,
        change: ConfigFileChange,
    },
    /// The driver stopped for good.
    Failed { source: String, error: SyncError },
}

/// Sending half of the engine queue, tagged with the driver's name.
#[derive(Debug, Clone)]
pub struct SourceSink {
    source: String,
    sender: mpsc::UnboundedSender<SourceEvent>,
}

impl SourceSink {
    pub fn new(source: impl Into<String>, sender: mpsc::UnboundedSender<SourceEvent>) -> Self {
        Self {
            source: source.into(),
            sender,
        }
    }

    /// Queues a change. Returns false once the engine has gone away.
    pub fn send(&self, change: ConfigFileChange) -> bool {
        self.sender
            .send(SourceEvent::Change {
                source: self.source.clone(),
                change,
            })
            .is_ok()
    }

    /// Queues several changes in order.
    pub fn send_all(&self, changes: impl IntoIterator<Item = ConfigFileChange>) -> bool {
        changes.into_iter().all(|change| self.send(change))
    }

    /// Reports a terminal failure.
    pub fn fail(&self, error: SyncError) {
        let _ = self.sender.send(SourceEvent::Failed {
            source: self.source.clone(),
            error,
        });
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// A watcher backend producing whole-file change notifications.
#[async_trait]
pub trait SourceDriver: Send {
    /// Human readable name, used in logs and notices.
    fn name(&self) -> String;

    /// Runs until `shutdown` flips to true (returns `Ok`) or the driver
    /// fails terminally (returns `Err`).
    async fn run(&mut self, sink: SourceSink, shutdown: watch::Receiver<bool>) -> Result<()>;
}

/// Exponential backoff for driver reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive failures tolerated before giving up.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): base, 2x base, 4x base, ... capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// Sleeps for `duration` unless shutdown is requested first.
///
/// Returns true if shutdown was requested.
pub(crate) async fn sleep_or_shutdown(
    duration: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}
