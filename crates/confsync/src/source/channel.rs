//! In-process source fed through a channel.

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use super::snapshot::FileSnapshot;
use super::{ChangeKind, ConfigFileChange, SourceDriver, SourceSink};
use crate::error::Result;

/// Handle used to push changes into a [`ChannelSourceDriver`].
pub type ChangeSender = mpsc::UnboundedSender<ConfigFileChange>;

/// Forwards changes pushed by the embedding application.
///
/// Pushed changes go through a [`FileSnapshot`], so re-sending identical
/// content or removing an unknown file is silently dropped, and `Add` and
/// `Update` are corrected to match what the driver has seen.
pub struct ChannelSourceDriver {
    name: String,
    receiver: mpsc::UnboundedReceiver<ConfigFileChange>,
    snapshot: FileSnapshot,
}

impl ChannelSourceDriver {
    pub fn new(name: impl Into<String>) -> (Self, ChangeSender) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let driver = Self {
            name: name.into(),
            receiver,
            snapshot: FileSnapshot::new(),
        };
        (driver, sender)
    }

    fn collapse(&mut self, change: ConfigFileChange) -> Option<ConfigFileChange> {
        let content = match change.kind {
            ChangeKind::Remove => None,
            ChangeKind::Add | ChangeKind::Update => Some(change.content.unwrap_or_default()),
        };
        self.snapshot.observe(&change.filename, content)
    }
}

#[async_trait]
impl SourceDriver for ChannelSourceDriver {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn run(&mut self, sink: SourceSink, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(());
                    }
                }
                received = self.receiver.recv() => match received {
                    Some(change) => {
                        if let Some(change) = self.collapse(change) {
                            if !sink.send(change) {
                                return Ok(());
                            }
                        }
                    }
                    // Every sender is gone; nothing more will arrive.
                    None => return Ok(()),
                }
            }
        }
    }
}
