//! Change feed for observing committed writes.
//!
//! The change feed emits one event per committed write, enabling:
//! - Waking parked long-polls
//! - Integration fan-out
//! - Audit logging
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut changes = store.subscribe();
//!
//! tokio::spawn(async move {
//!     while let Some(event) = changes.recv().await {
//!         println!("{} -> r{}", event.key, event.revision);
//!     }
//! });
//! ```

use hearth_protocol::ChangeEvent;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Receiving end of a change feed subscription.
pub type ChangeReceiver = UnboundedReceiver<ChangeEvent>;

/// A change feed that distributes committed writes to subscribers.
///
/// The change feed:
/// - Emits only committed writes
/// - Preserves emission order per subscriber
/// - Never drops an event for a live subscriber
/// - Is thread-safe
#[derive(Debug, Default)]
pub struct ChangeFeed {
    subscribers: Mutex<Vec<UnboundedSender<ChangeEvent>>>,
}

impl ChangeFeed {
    /// Creates a new change feed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to the change feed.
    ///
    /// Returns a receiver that will receive all future change events.
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> ChangeReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Emits a change event to all subscribers.
    ///
    /// Called by the object store after a commit is durable. Subscribers
    /// whose receiver has been dropped are removed.
    pub fn emit(&self, event: ChangeEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_protocol::{ObjectKey, ObjectValue, Source, StoredObject};

    fn event(revision: u64) -> ChangeEvent {
        let object = StoredObject::new(
            ObjectKey::parse("device.A").unwrap(),
            ObjectValue::new(),
            revision,
            0,
        );
        ChangeEvent::committed(&object, Source::Device)
    }

    #[tokio::test]
    async fn emit_and_receive() {
        let feed = ChangeFeed::new();
        let mut rx = feed.subscribe();

        feed.emit(event(1));
        assert_eq!(rx.recv().await.unwrap().revision, 1);
    }

    #[tokio::test]
    async fn multiple_subscribers() {
        let feed = ChangeFeed::new();
        let mut rx1 = feed.subscribe();
        let mut rx2 = feed.subscribe();

        feed.emit(event(1));

        assert_eq!(rx1.recv().await.unwrap(), event(1));
        assert_eq!(rx2.recv().await.unwrap(), event(1));
    }

    #[tokio::test]
    async fn order_is_preserved() {
        let feed = ChangeFeed::new();
        let mut rx = feed.subscribe();

        for revision in 1..=5 {
            feed.emit(event(revision));
        }
        for revision in 1..=5 {
            assert_eq!(rx.recv().await.unwrap().revision, revision);
        }
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let feed = ChangeFeed::new();
        let rx = feed.subscribe();
        let _keep = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 2);

        drop(rx);
        feed.emit(event(1));
        assert_eq!(feed.subscriber_count(), 1);
    }
}
