//! Action broadcaster: republishes committed actions to subscribers.

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::reconcile::Action;

/// Broadcasts committed actions, in commit order, to every current subscriber.
///
/// There is no replay: a late subscriber only sees actions committed after
/// it subscribed. A subscriber that falls more than `capacity` actions
/// behind gets `RecvError::Lagged` rather than slowing the engine down.
pub struct ActionBroadcaster<T> {
    sender: Arc<broadcast::Sender<Action<T>>>,
}

impl<T> Clone for ActionBroadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
        }
    }
}

impl<T: Clone> ActionBroadcaster<T> {
    /// Creates a new broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Publishes one action.
    pub fn send(&self, action: Action<T>) {
        // No active receivers is fine
        let _ = self.sender.send(action);
    }

    /// Publishes a batch of actions in order.
    pub fn send_all(&self, actions: impl IntoIterator<Item = Action<T>>) {
        for action in actions {
            self.send(action);
        }
    }

    /// Creates a new subscriber.
    pub fn subscribe(&self) -> broadcast::Receiver<Action<T>> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Clone> Default for ActionBroadcaster<T> {
    fn default() -> Self {
        Self::new(256)
    }
}
