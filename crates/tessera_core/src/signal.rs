//! Completion signals from instructions back to their transaction.
//!
//! Every instruction owns one channel. The sending half, [`CommitSignal`],
//! is handed to the instruction; the receiving half stays with the
//! transaction, which drains it whenever it is polled. Channels move with
//! their instruction when transactions are merged, so a signal cloned
//! before a merge still reaches the right transaction afterwards.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

/// A message from an instruction to its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The instruction finished its commit work.
    Ready,
    /// The instruction cannot proceed; the whole transaction is aborted.
    Cancel,
}

/// Handle an instruction uses to report readiness or cancellation.
///
/// Cheap to clone and `Send`, so the report may come from wherever the
/// acknowledgement is observed. Reports sent after the transaction has
/// finished (or been dropped) are ignored.
#[derive(Debug, Clone)]
pub struct CommitSignal {
    tx: Sender<Completion>,
}

impl CommitSignal {
    /// Reports that the instruction is ready to be applied.
    pub fn ready(&self) {
        let _ = self.tx.send(Completion::Ready);
    }

    /// Cancels the owning transaction.
    pub fn cancel(&self) {
        let _ = self.tx.send(Completion::Cancel);
    }
}

/// Receiving half of an instruction's completion channel.
#[derive(Debug)]
pub(crate) struct CompletionReceiver {
    rx: Receiver<Completion>,
}

impl CompletionReceiver {
    /// Returns every completion reported since the last call.
    pub(crate) fn drain(&self) -> impl Iterator<Item = Completion> + '_ {
        std::iter::from_fn(move || match self.rx.try_recv() {
            Ok(completion) => Some(completion),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        })
    }
}

/// Creates a new completion channel.
pub(crate) fn completion_channel() -> (CommitSignal, CompletionReceiver) {
    let (tx, rx) = mpsc::channel();
    (CommitSignal { tx }, CompletionReceiver { rx })
}
