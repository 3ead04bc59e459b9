//! Lifecycle event feed for observing transactions.
//!
//! The feed reports what the manager did with each transaction, enabling:
//! - Debug tooling and tracing of stuck transactions
//! - Tests that assert on exact lifecycle ordering
//! - Observers on other threads
//!
//! Listeners that must act synchronously (add instructions, apply) use
//! [`TransactionManager::on_pending`](crate::TransactionManager::on_pending)
//! and [`on_done`](crate::TransactionManager::on_done) instead; the feed is
//! read-only.
//!
//! # Usage
//!
//! ```rust,ignore
//! let receiver = manager.subscribe();
//!
//! manager.submit(txn)?;
//! manager.dispatch()?;
//!
//! while let Ok(event) = receiver.try_recv() {
//!     println!("{}: {:?}", event.id, event.kind);
//! }
//! ```

use crate::types::{ObjectId, Outcome, TransactionId};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};

/// What happened to a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// The expansion loop settled and an ID was assigned.
    Submitted {
        /// Objects touched after expansion.
        objects: Vec<ObjectId>,
    },
    /// A newly submitted transaction was folded into this one.
    Merged {
        /// Objects this transaction touches after the merge.
        objects: Vec<ObjectId>,
    },
    /// Instructions started committing.
    Committed,
    /// The transaction reached an outcome.
    Done(Outcome),
    /// Instructions were applied.
    Applied,
}

/// A single lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionEvent {
    /// Position in the feed, starting at 1.
    pub sequence: u64,
    /// The transaction concerned.
    pub id: TransactionId,
    /// What happened.
    pub kind: EventKind,
}

struct FeedState {
    next_sequence: u64,
    history: VecDeque<TransactionEvent>,
}

/// Distributes lifecycle events to subscribers.
///
/// The feed:
/// - Preserves emission order
/// - Supports multiple subscribers
/// - Keeps a bounded history for polling
pub struct EventFeed {
    subscribers: RwLock<Vec<Sender<TransactionEvent>>>,
    state: RwLock<FeedState>,
    max_history: usize,
}

impl EventFeed {
    /// Creates a feed with the default history limit.
    pub fn new() -> Self {
        Self::with_max_history(1024)
    }

    /// Creates a feed with a specific history limit.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            state: RwLock::new(FeedState {
                next_sequence: 1,
                history: VecDeque::new(),
            }),
            max_history,
        }
    }

    /// Subscribes to the feed.
    ///
    /// Returns a receiver for all future events. Dropped receivers are
    /// pruned on the next emit.
    pub fn subscribe(&self) -> Receiver<TransactionEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits an event, returning its sequence number.
    pub fn emit(&self, id: TransactionId, kind: EventKind) -> u64 {
        let event = {
            let mut state = self.state.write();
            let event = TransactionEvent {
                sequence: state.next_sequence,
                id,
                kind,
            };
            state.next_sequence += 1;
            state.history.push_back(event.clone());
            while state.history.len() > self.max_history {
                state.history.pop_front();
            }
            event
        };

        let sequence = event.sequence;
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        sequence
    }

    /// Returns events with sequence > `cursor`, up to `limit`.
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<TransactionEvent> {
        let state = self.state.read();
        state
            .history
            .iter()
            .filter(|event| event.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the sequence number of the last event emitted, 0 if none.
    pub fn latest_sequence(&self) -> u64 {
        self.state.read().next_sequence - 1
    }

    /// Returns the number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns the number of events in history.
    pub fn history_len(&self) -> usize {
        self.state.read().history.len()
    }
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventFeed")
            .field("latest_sequence", &self.latest_sequence())
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn id(n: u64) -> TransactionId {
        TransactionId::new(n)
    }

    #[test]
    fn emit_and_receive() {
        let feed = EventFeed::new();
        let rx = feed.subscribe();

        feed.emit(id(1), EventKind::Committed);

        let received = rx.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(received.sequence, 1);
        assert_eq!(received.id, id(1));
        assert_eq!(received.kind, EventKind::Committed);
    }

    #[test]
    fn multiple_subscribers() {
        let feed = EventFeed::new();
        let rx1 = feed.subscribe();
        let rx2 = feed.subscribe();

        feed.emit(id(3), EventKind::Done(Outcome::Ready));

        assert_eq!(rx1.recv().unwrap().kind, EventKind::Done(Outcome::Ready));
        assert_eq!(rx2.recv().unwrap().kind, EventKind::Done(Outcome::Ready));
    }

    #[test]
    fn subscriber_cleanup() {
        let feed = EventFeed::new();
        let rx = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);

        drop(rx);
        feed.emit(id(1), EventKind::Applied);
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn poll_from_cursor() {
        let feed = EventFeed::new();
        for n in 1..=5 {
            feed.emit(id(n), EventKind::Committed);
        }

        let events = feed.poll(2, 10);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].sequence, 3);
        assert_eq!(events[2].id, id(5));
    }

    #[test]
    fn history_truncation() {
        let feed = EventFeed::with_max_history(5);
        for n in 1..=10 {
            feed.emit(id(n), EventKind::Applied);
        }

        assert_eq!(feed.history_len(), 5);
        assert_eq!(feed.poll(0, 100)[0].sequence, 6);
        assert_eq!(feed.latest_sequence(), 10);
    }

    #[test]
    fn threaded_subscribe() {
        let feed = Arc::new(EventFeed::new());
        let rx = feed.subscribe();

        let feed_clone = Arc::clone(&feed);
        let handle = thread::spawn(move || {
            feed_clone.emit(id(7), EventKind::Done(Outcome::TimedOut));
        });

        let received = rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert_eq!(received.kind, EventKind::Done(Outcome::TimedOut));
        handle.join().unwrap();
    }
}
