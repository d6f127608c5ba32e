//! Side channel for problems and noteworthy events that are not actions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::reconcile::Reassignment;

/// What a notice is about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NoticeKind {
    /// A file failed parsing or validation; its previous items are kept.
    #[serde(rename_all = "camelCase")]
    ValidationFailed {
        filename: String,
        details: Vec<String>,
    },
    /// A source driver stopped for good.
    #[serde(rename_all = "camelCase")]
    SourceFailed { source: String, message: String },
    /// A file claimed an identity tracked under another file.
    IdentityReassigned(Reassignment),
}

/// A timestamped notice.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: NoticeKind,
}

impl Notice {
    pub fn new(kind: NoticeKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }
}

/// Broadcasts notices to subscribers.
#[derive(Clone)]
pub struct NoticeBroadcaster {
    sender: broadcast::Sender<Notice>,
}

impl NoticeBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn send(&self, kind: NoticeKind) {
        // Ignore errors - no active receivers is fine
        let _ = self.sender.send(Notice::new(kind));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }

    pub fn validation_failed(&self, filename: &str, details: Vec<String>) {
        self.send(NoticeKind::ValidationFailed {
            filename: filename.to_string(),
            details,
        });
    }

    pub fn source_failed(&self, source: &str, message: &str) {
        self.send(NoticeKind::SourceFailed {
            source: source.to_string(),
            message: message.to_string(),
        });
    }

    pub fn identity_reassigned(&self, reassignment: Reassignment) {
        self.send(NoticeKind::IdentityReassigned(reassignment));
    }
}

impl Default for NoticeBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
