//! Test fixtures and manager helpers.
//!
//! Provides a manager wired to a manual clock, instructions with scripted
//! behaviour, and a shared journal recording every lifecycle hook.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::{
    CommitSignal, Config, Instruction, ManualClock, ObjectId, Outcome, Transaction,
    TransactionId, TransactionManager,
};

/// Instruction lifecycle hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    /// `set_pending` was called.
    Pending,
    /// `precommit` was called.
    Precommit,
    /// `commit` was called.
    Commit,
    /// `apply` was called.
    Apply,
}

impl Hook {
    /// Returns the hook's lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Precommit => "precommit",
            Self::Commit => "commit",
            Self::Apply => "apply",
        }
    }
}

/// One journal line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// The hook that ran.
    pub hook: Hook,
    /// The instruction's object.
    pub object: ObjectId,
}

/// Shared, ordered record of instruction hooks.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<JournalEntry>>>,
}

impl Journal {
    /// Creates an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn record(&self, hook: Hook, object: &ObjectId) {
        self.entries.lock().push(JournalEntry {
            hook,
            object: object.clone(),
        });
    }

    /// Returns a copy of every entry.
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.lock().clone()
    }

    /// Returns the hooks in order, rendered as `hook:object`.
    pub fn lines(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .map(|entry| format!("{}:{}", entry.hook.name(), entry.object))
            .collect()
    }

    /// Returns how many times `hook` ran.
    pub fn count(&self, hook: Hook) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.hook == hook)
            .count()
    }

    /// Returns how many times `hook` ran for `object`.
    pub fn count_for(&self, hook: Hook, object: &str) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.hook == hook && entry.object.as_str() == object)
            .count()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// What a [`RecordingInstruction`] does when driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Reports ready from inside `commit`.
    Ready,
    /// Keeps its signal; the test fires it through a [`SignalHandle`].
    Hold,
    /// Cancels from inside `set_pending`.
    CancelOnPending,
    /// Cancels from inside `commit`.
    CancelOnCommit,
}

/// Lets a test fire an instruction's signal after the fact.
#[derive(Debug, Clone, Default)]
pub struct SignalHandle {
    signal: Arc<Mutex<Option<CommitSignal>>>,
}

impl SignalHandle {
    fn arm(&self, signal: &CommitSignal) {
        *self.signal.lock() = Some(signal.clone());
    }

    /// Returns true once the instruction has been staged.
    pub fn is_armed(&self) -> bool {
        self.signal.lock().is_some()
    }

    /// Reports the instruction ready.
    ///
    /// # Panics
    ///
    /// Panics if the instruction was never staged.
    pub fn ready(&self) {
        self.signal
            .lock()
            .as_ref()
            .expect("instruction was never staged")
            .ready();
    }

    /// Cancels the instruction's transaction.
    ///
    /// # Panics
    ///
    /// Panics if the instruction was never staged.
    pub fn cancel(&self) {
        self.signal
            .lock()
            .as_ref()
            .expect("instruction was never staged")
            .cancel();
    }
}

/// Instruction that journals every hook and follows a [`Behavior`].
#[derive(Debug)]
pub struct RecordingInstruction {
    object: ObjectId,
    behavior: Behavior,
    journal: Journal,
    handle: SignalHandle,
}

impl RecordingInstruction {
    /// Creates an instruction for `object`.
    pub fn new(object: impl Into<ObjectId>, behavior: Behavior, journal: &Journal) -> Self {
        Self {
            object: object.into(),
            behavior,
            journal: journal.clone(),
            handle: SignalHandle::default(),
        }
    }

    /// Creates an instruction that readies synchronously.
    pub fn ready(object: impl Into<ObjectId>, journal: &Journal) -> Self {
        Self::new(object, Behavior::Ready, journal)
    }

    /// Creates an instruction that waits for its handle.
    pub fn held(object: impl Into<ObjectId>, journal: &Journal) -> (Self, SignalHandle) {
        let instruction = Self::new(object, Behavior::Hold, journal);
        let handle = instruction.handle();
        (instruction, handle)
    }

    /// Returns a handle to fire this instruction's signal.
    pub fn handle(&self) -> SignalHandle {
        self.handle.clone()
    }
}

impl Instruction for RecordingInstruction {
    fn object(&self) -> &ObjectId {
        &self.object
    }

    fn set_pending(&mut self, signal: &CommitSignal) {
        self.journal.record(Hook::Pending, &self.object);
        self.handle.arm(signal);
        if self.behavior == Behavior::CancelOnPending {
            signal.cancel();
        }
    }

    fn precommit(&mut self) {
        self.journal.record(Hook::Precommit, &self.object);
    }

    fn commit(&mut self, signal: &CommitSignal) {
        self.journal.record(Hook::Commit, &self.object);
        match self.behavior {
            Behavior::Ready => signal.ready(),
            Behavior::CancelOnCommit => signal.cancel(),
            Behavior::Hold | Behavior::CancelOnPending => {}
        }
    }

    fn apply(&mut self) {
        self.journal.record(Hook::Apply, &self.object);
    }
}

/// Builds a transaction with one synchronously-ready instruction per object.
///
/// # Panics
///
/// Panics if an instruction cannot be added (never, for a new transaction).
pub fn transaction_of<'a>(
    objects: impl IntoIterator<Item = &'a str>,
    journal: &Journal,
) -> Transaction {
    let mut txn = Transaction::new();
    for object in objects {
        txn.add_instruction(RecordingInstruction::ready(object, journal))
            .expect("new transactions accept instructions");
    }
    txn
}

/// `done` notifications collected by a [`TestManager`].
pub type DoneLog = Arc<Mutex<Vec<(TransactionId, Outcome)>>>;

/// A manager driven by a manual clock, recording every `done`.
pub struct TestManager {
    /// The manager under test.
    pub manager: TransactionManager,
    clock: ManualClock,
    done: DoneLog,
}

impl TestManager {
    /// Creates a manager with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a manager with `config`.
    pub fn with_config(config: Config) -> Self {
        let clock = ManualClock::new();
        let mut manager = TransactionManager::new(config, clock.clone());
        let done = DoneLog::default();
        let sink = Arc::clone(&done);
        manager.on_done(move |id, outcome| sink.lock().push((id, outcome)));
        Self {
            manager,
            clock,
            done,
        }
    }

    /// Returns the manager's clock.
    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Moves time forward by `ms` milliseconds and dispatches.
    ///
    /// # Panics
    ///
    /// Panics if dispatch fails.
    pub fn advance_ms(&mut self, ms: u64) -> usize {
        self.advance(Duration::from_millis(ms))
    }

    /// Moves time forward and dispatches.
    ///
    /// # Panics
    ///
    /// Panics if dispatch fails.
    pub fn advance(&mut self, by: Duration) -> usize {
        self.clock.advance(by);
        self.manager.dispatch().expect("dispatch failed")
    }

    /// Returns every `done` notification so far.
    pub fn done(&self) -> Vec<(TransactionId, Outcome)> {
        self.done.lock().clone()
    }

    /// Returns the outcomes reported for `id`.
    pub fn outcomes_of(&self, id: TransactionId) -> Vec<Outcome> {
        self.done
            .lock()
            .iter()
            .filter(|(done_id, _)| *done_id == id)
            .map(|(_, outcome)| *outcome)
            .collect()
    }
}

impl Default for TestManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestManager {
    type Target = TransactionManager;

    fn deref(&self) -> &Self::Target {
        &self.manager
    }
}

impl std::ops::DerefMut for TestManager {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_lines_are_ordered() {
        let journal = Journal::new();
        journal.record(Hook::Pending, &ObjectId::from("a"));
        journal.record(Hook::Apply, &ObjectId::from("a"));

        assert_eq!(journal.lines(), vec!["pending:a", "apply:a"]);
        assert_eq!(journal.count(Hook::Apply), 1);
        assert_eq!(journal.count_for(Hook::Pending, "b"), 0);
    }

    #[test]
    fn test_manager_records_done() {
        let journal = Journal::new();
        let mut tm = TestManager::new();
        let id = tm.submit(transaction_of(["a"], &journal)).unwrap();
        tm.advance_ms(0);

        assert_eq!(tm.done(), vec![(id, Outcome::Ready)]);
        assert_eq!(journal.count(Hook::Apply), 1);
    }

    #[test]
    fn handle_is_armed_by_set_pending() {
        let journal = Journal::new();
        let (instruction, handle) = RecordingInstruction::held("a", &journal);
        assert!(!handle.is_armed());

        let mut txn = Transaction::new();
        txn.add_instruction(instruction).unwrap();
        txn.set_pending().unwrap();
        assert!(handle.is_armed());
    }
}
