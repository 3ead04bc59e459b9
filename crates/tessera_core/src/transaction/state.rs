//! Transaction state machine.

use crate::error::{TxnError, TxnResult};
use crate::instruction::Instruction;
use crate::registry::ObjectRegistry;
use crate::signal::{completion_channel, CommitSignal, Completion, CompletionReceiver};
use crate::types::{ObjectId, Outcome, TransactionId};
use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// State of a transaction.
///
/// ```text
/// New --set_pending--> Pending --commit--> Committed
/// Committed --all ready--> Ready --apply--> Applied
/// Committed --timeout--> TimedOut --apply--> Applied
/// {Pending, Committed} --any cancel--> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Being built; instructions are not staged yet.
    New,
    /// Every instruction has been staged.
    Pending,
    /// Instructions are committing; waiting for readiness.
    Committed,
    /// Every instruction reported ready.
    Ready,
    /// An instruction cancelled. Final.
    Cancelled,
    /// The commit timeout elapsed before every instruction was ready.
    TimedOut,
    /// Changes are visible. Final.
    Applied,
}

impl TransactionState {
    /// Returns true for the two final states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, TransactionState::Cancelled | TransactionState::Applied)
    }

    /// Returns true while instructions are committing.
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        matches!(self, TransactionState::Committed)
    }

    /// Returns true if instructions may still be added or merged in.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, TransactionState::New | TransactionState::Pending)
    }

    /// Returns true if the transaction may be applied.
    #[must_use]
    pub const fn is_applicable(self) -> bool {
        matches!(self, TransactionState::Ready | TransactionState::TimedOut)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::New => "new",
            TransactionState::Pending => "pending",
            TransactionState::Committed => "committed",
            TransactionState::Ready => "ready",
            TransactionState::Cancelled => "cancelled",
            TransactionState::TimedOut => "timed-out",
            TransactionState::Applied => "applied",
        };
        f.write_str(name)
    }
}

/// An instruction together with its completion channel.
struct Slot {
    instruction: Box<dyn Instruction>,
    signal: CommitSignal,
    completions: CompletionReceiver,
    /// `set_pending` has been delivered (possibly by a transaction this
    /// slot was merged out of).
    pending: bool,
    ready: bool,
}

impl Slot {
    fn new(instruction: Box<dyn Instruction>) -> Self {
        let (signal, completions) = completion_channel();
        Self {
            instruction,
            signal,
            completions,
            pending: false,
            ready: false,
        }
    }

    fn stage(&mut self) {
        if !self.pending {
            self.instruction.set_pending(&self.signal);
            self.pending = true;
        }
    }
}

/// A group of instructions that becomes visible together or not at all.
///
/// Transactions are usually built by a collaborator and handed to a
/// [`TransactionManager`](crate::TransactionManager), which expands, stages,
/// schedules, commits and applies them. They can also be driven by hand:
///
/// ```rust,ignore
/// let mut txn = Transaction::new();
/// txn.add_instruction(resize)?;
/// txn.set_pending()?;
/// if let Some(outcome) = txn.commit(clock.now())? { /* done */ }
/// // ... later, from the event loop:
/// if let Some(outcome) = txn.poll(clock.now()) {
///     if outcome.is_applicable() {
///         txn.apply()?;
///     }
/// }
/// ```
pub struct Transaction {
    id: Option<TransactionId>,
    state: TransactionState,
    slots: Vec<Slot>,
    dirty: bool,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    ready_count: usize,
    /// Outcome reached but not yet handed to the caller.
    unreported: Option<Outcome>,
}

impl Transaction {
    /// Creates an empty transaction.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: None,
            state: TransactionState::New,
            slots: Vec::new(),
            dirty: false,
            timeout: None,
            deadline: None,
            ready_count: 0,
            unreported: None,
        }
    }

    /// Creates an empty transaction with its own commit timeout.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        let mut txn = Self::new();
        txn.timeout = Some(timeout);
        txn
    }

    /// Returns the ID, once the manager has assigned one.
    #[must_use]
    pub fn id(&self) -> Option<TransactionId> {
        self.id
    }

    pub(crate) fn assign_id(&mut self, id: TransactionId) {
        self.id = Some(id);
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Returns the timeout this transaction was given, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn set_default_timeout(&mut self, timeout: Duration) {
        self.timeout.get_or_insert(timeout);
    }

    /// Returns when the commit timeout fires. Only set while committed, and
    /// never set when the timeout overflows the clock.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the transaction holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns how many instructions have reported ready.
    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.ready_count
    }

    /// Returns true if instructions were added since the last
    /// [`clear_dirty`](Self::clear_dirty).
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clears the dirty flag.
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Returns the set of objects touched by this transaction.
    #[must_use]
    pub fn objects(&self) -> BTreeSet<ObjectId> {
        self.slots
            .iter()
            .map(|slot| slot.instruction.object().clone())
            .collect()
    }

    /// Returns the touched objects that `registry` can resolve.
    pub fn participants<R>(&self, registry: &R) -> Vec<ObjectId>
    where
        R: ObjectRegistry + ?Sized,
    {
        self.objects()
            .into_iter()
            .filter(|object| registry.contains(object))
            .collect()
    }

    /// Returns true if both transactions touch at least one common object.
    #[must_use]
    pub fn does_intersect(&self, other: &Transaction) -> bool {
        let mine = self.objects();
        other
            .slots
            .iter()
            .any(|slot| mine.contains(slot.instruction.object()))
    }

    /// Adds an instruction.
    ///
    /// Legal while NEW or PENDING. In PENDING the instruction is staged
    /// right away. Marks the transaction dirty.
    pub fn add_instruction<I>(&mut self, instruction: I) -> TxnResult<()>
    where
        I: Instruction + 'static,
    {
        self.add_boxed_instruction(Box::new(instruction))
    }

    /// Adds an already boxed instruction. See
    /// [`add_instruction`](Self::add_instruction).
    pub fn add_boxed_instruction(&mut self, instruction: Box<dyn Instruction>) -> TxnResult<()> {
        if !self.state.is_open() {
            return Err(TxnError::invalid_state("add an instruction to", self.state));
        }
        self.push_slot(Slot::new(instruction));
        Ok(())
    }

    fn push_slot(&mut self, mut slot: Slot) {
        trace!(object = %slot.instruction.object(), state = %self.state, "adding instruction");
        if self.state == TransactionState::Pending {
            slot.stage();
        }
        self.slots.push(slot);
        self.dirty = true;
    }

    /// Stages every instruction, in insertion order. NEW to PENDING.
    pub fn set_pending(&mut self) -> TxnResult<()> {
        if self.state != TransactionState::New {
            return Err(TxnError::invalid_state("stage", self.state));
        }
        for slot in &mut self.slots {
            slot.stage();
        }
        self.state = TransactionState::Pending;
        Ok(())
    }

    /// Commits every instruction. PENDING to COMMITTED.
    ///
    /// Runs `precommit` on every instruction, then `commit` on every
    /// instruction, and starts the timeout at `now`. Returns the outcome if
    /// the transaction already finished: every instruction readied
    /// synchronously, or a cancel was reported while pending.
    pub fn commit(&mut self, now: Instant) -> TxnResult<Option<Outcome>> {
        if self.state != TransactionState::Pending {
            return Err(TxnError::invalid_state("commit", self.state));
        }

        self.absorb_completions();
        if self.state != TransactionState::Pending {
            return Ok(self.unreported.take());
        }

        let timeout = self
            .timeout
            .unwrap_or(crate::config::DEFAULT_COMMIT_TIMEOUT);
        self.state = TransactionState::Committed;
        // A timeout past the end of the clock never fires.
        self.deadline = now.checked_add(timeout);
        debug!(
            id = ?self.id,
            instructions = self.slots.len(),
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "committing transaction"
        );

        for slot in &mut self.slots {
            slot.instruction.precommit();
        }
        for slot in &mut self.slots {
            slot.instruction.commit(&slot.signal);
        }

        Ok(self.poll(now))
    }

    /// Processes reported completions and the timeout.
    ///
    /// Returns `Some(outcome)` exactly once, when the transaction reaches
    /// READY, TIMED_OUT or CANCELLED. This is the `done` notification.
    pub fn poll(&mut self, now: Instant) -> Option<Outcome> {
        self.absorb_completions();

        if self.state == TransactionState::Committed {
            if self.ready_count == self.slots.len() {
                self.finish(Outcome::Ready);
            } else if self.deadline.is_some_and(|deadline| now >= deadline) {
                self.finish(Outcome::TimedOut);
            }
        }

        self.unreported.take()
    }

    fn absorb_completions(&mut self) {
        let state = self.state;
        let mut cancelled = false;
        let mut newly_ready = 0;

        for slot in &mut self.slots {
            for completion in slot.completions.drain() {
                match (completion, state) {
                    (Completion::Cancel, TransactionState::Pending | TransactionState::Committed) => {
                        cancelled = true;
                    }
                    (Completion::Ready, TransactionState::Committed) if !slot.ready => {
                        slot.ready = true;
                        newly_ready += 1;
                    }
                    (completion, state) => {
                        trace!(?completion, %state, object = %slot.instruction.object(), "ignoring completion");
                    }
                }
            }
        }

        self.ready_count += newly_ready;
        if cancelled {
            self.finish(Outcome::Cancelled);
        }
    }

    fn finish(&mut self, outcome: Outcome) {
        self.state = match outcome {
            Outcome::Ready => TransactionState::Ready,
            Outcome::Cancelled => TransactionState::Cancelled,
            Outcome::TimedOut => TransactionState::TimedOut,
        };
        self.deadline = None;
        self.unreported = Some(outcome);

        match outcome {
            Outcome::Ready => debug!(id = ?self.id, "transaction ready"),
            Outcome::Cancelled => warn!(id = ?self.id, "transaction cancelled"),
            Outcome::TimedOut => warn!(
                id = ?self.id,
                ready = self.ready_count,
                instructions = self.slots.len(),
                "transaction timed out"
            ),
        }
    }

    /// Applies every instruction. READY or TIMED_OUT to APPLIED.
    pub fn apply(&mut self) -> TxnResult<()> {
        if !self.state.is_applicable() {
            return Err(TxnError::invalid_state("apply", self.state));
        }
        for slot in &mut self.slots {
            slot.instruction.apply();
        }
        self.state = TransactionState::Applied;
        debug!(id = ?self.id, instructions = self.slots.len(), "transaction applied");
        Ok(())
    }

    /// Checks whether `other` may be merged into this transaction.
    pub fn can_merge(&self, other: &Transaction) -> TxnResult<()> {
        let legal = self.state.is_open()
            && other.state.is_open()
            && !(self.state == TransactionState::New && other.state == TransactionState::Pending);
        if legal {
            Ok(())
        } else {
            Err(TxnError::merge_rejected(self.state, other.state))
        }
    }

    /// Moves every instruction of `other` into this transaction.
    ///
    /// Both must be NEW or PENDING, and a PENDING transaction cannot be
    /// merged into a NEW one. Instructions already staged by `other` are
    /// not staged a second time. `other` is consumed; its ID, if it had
    /// one, is retired. On error `other` is dropped without any of its
    /// instructions being applied; use [`can_merge`](Self::can_merge) first
    /// to keep it.
    pub fn merge(&mut self, mut other: Transaction) -> TxnResult<()> {
        self.can_merge(&other)?;
        debug!(
            into = ?self.id,
            instructions = other.slots.len(),
            "merging transaction"
        );
        if self.timeout.is_none() {
            self.timeout = other.timeout;
        }
        for slot in other.slots.drain(..) {
            self.push_slot(slot);
        }
        Ok(())
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("objects", &self.objects())
            .field("ready", &self.ready_count)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}
