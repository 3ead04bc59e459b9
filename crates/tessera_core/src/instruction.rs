//! The instruction contract.
//!
//! An instruction is one staged change to one object. Participants
//! implement [`Instruction`] for every kind of change they want to make
//! transactional and add boxed instances to a
//! [`Transaction`](crate::Transaction).
//!
//! # Lifecycle
//!
//! Each hook is called at most once, always by the owning transaction:
//!
//! 1. [`set_pending`](Instruction::set_pending) when the transaction is
//!    staged. Record the target value; do not make it visible.
//! 2. [`precommit`](Instruction::precommit) on every instruction of the
//!    transaction, before any of them is committed.
//! 3. [`commit`](Instruction::commit). Report [`CommitSignal::ready`]
//!    immediately or later, or [`CommitSignal::cancel`].
//! 4. [`apply`](Instruction::apply) only if the transaction finished READY
//!    or TIMED_OUT. Make the staged value current.
//!
//! A cancelled transaction never calls `apply`. Instructions must not make
//! anything externally visible before `apply`, or must undo it themselves
//! when they cancel.

use crate::signal::CommitSignal;
use crate::types::ObjectId;

/// A unit of change to exactly one object.
pub trait Instruction {
    /// Returns the object this instruction changes. Must be pure.
    fn object(&self) -> &ObjectId;

    /// Stages the change without making it visible.
    ///
    /// The signal may be kept to cancel the transaction before commit.
    fn set_pending(&mut self, signal: &CommitSignal);

    /// Called on every instruction of the transaction before the first
    /// `commit`.
    fn precommit(&mut self) {}

    /// Starts committing the change. Readiness may be reported from inside
    /// this call or later through a clone of `signal`.
    fn commit(&mut self, signal: &CommitSignal);

    /// Makes the staged change current.
    fn apply(&mut self);
}

impl std::fmt::Debug for dyn Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instruction")
            .field("object", self.object())
            .finish_non_exhaustive()
    }
}
