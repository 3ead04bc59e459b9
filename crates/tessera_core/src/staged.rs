//! Staged object state.
//!
//! [`Staged`] is the participant-side half of the protocol for the common
//! case of "set a property of an object atomically". It keeps three views
//! of one value:
//!
//! - **current**: what everyone observes; only changed by `apply`
//! - **pending**: the value most recently staged by `set_pending`
//! - **committed**: the value most recently committed
//!
//! [`SetValue`] instructions move a value through those views. Dropping a
//! `SetValue` that was never applied (its transaction was cancelled)
//! withdraws whatever it staged, so a cancelled change leaves no trace.
//!
//! # Usage
//!
//! ```rust,ignore
//! let geometry = Staged::new("view-7", Rect::new(0, 0, 640, 480));
//!
//! let mut txn = Transaction::new();
//! txn.add_instruction(geometry.set_acked(Rect::new(0, 0, 800, 600)))?;
//! manager.submit(txn)?;
//! manager.dispatch()?;
//!
//! // The client acknowledged the configure:
//! geometry.acknowledge();
//! manager.dispatch()?;
//! assert_eq!(geometry.current(), Rect::new(0, 0, 800, 600));
//! ```

use crate::instruction::Instruction;
use crate::signal::CommitSignal;
use crate::types::ObjectId;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

/// How a [`SetValue`] reports readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    /// Ready as soon as it commits.
    Immediate,
    /// Ready when [`Staged::acknowledge`] is called.
    Acknowledged,
}

struct Inner<T> {
    object: ObjectId,
    current: T,
    pending: Option<(u64, T)>,
    committed: Option<(u64, T)>,
    destroyed: bool,
    next_serial: u64,
    /// Signals of staged, not yet applied instructions.
    outstanding: Vec<(u64, CommitSignal)>,
    /// Committed instructions waiting for `acknowledge`.
    awaiting_ack: Vec<(u64, CommitSignal)>,
}

impl<T> Inner<T> {
    fn withdraw(&mut self, serial: u64) {
        if self.pending.as_ref().is_some_and(|(s, _)| *s == serial) {
            self.pending = None;
        }
        if self.committed.as_ref().is_some_and(|(s, _)| *s == serial) {
            self.committed = None;
        }
        self.outstanding.retain(|(s, _)| *s != serial);
        self.awaiting_ack.retain(|(s, _)| *s != serial);
    }
}

/// Shared handle to one object's staged value.
///
/// Clones refer to the same object.
pub struct Staged<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for Staged<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Staged<T> {
    /// Creates an object whose current value is `initial`.
    pub fn new(object: impl Into<ObjectId>, initial: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                object: object.into(),
                current: initial,
                pending: None,
                committed: None,
                destroyed: false,
                next_serial: 1,
                outstanding: Vec::new(),
                awaiting_ack: Vec::new(),
            })),
        }
    }

    /// Returns the object's ID.
    pub fn object(&self) -> ObjectId {
        self.inner.lock().object.clone()
    }

    /// Returns the visible value.
    pub fn current(&self) -> T {
        self.inner.lock().current.clone()
    }

    /// Returns the most recently staged value, if it is not applied yet.
    pub fn pending(&self) -> Option<T> {
        self.inner.lock().pending.as_ref().map(|(_, v)| v.clone())
    }

    /// Returns the most recently committed value, if it is not applied yet.
    pub fn committed(&self) -> Option<T> {
        self.inner.lock().committed.as_ref().map(|(_, v)| v.clone())
    }

    /// Returns true once [`destroy`](Self::destroy) has been called.
    pub fn is_destroyed(&self) -> bool {
        self.inner.lock().destroyed
    }

    /// Creates an instruction that sets the value and is ready on commit.
    pub fn set(&self, value: T) -> SetValue<T> {
        self.instruction(value, Readiness::Immediate)
    }

    /// Creates an instruction that sets the value and is ready once the
    /// change is [acknowledged](Self::acknowledge).
    pub fn set_acked(&self, value: T) -> SetValue<T> {
        self.instruction(value, Readiness::Acknowledged)
    }

    fn instruction(&self, value: T, readiness: Readiness) -> SetValue<T> {
        let mut inner = self.inner.lock();
        let serial = inner.next_serial;
        inner.next_serial += 1;
        SetValue {
            staged: self.clone(),
            object: inner.object.clone(),
            serial,
            value,
            readiness,
            applied: false,
        }
    }

    /// Reports readiness for every committed change waiting for an
    /// acknowledgement. Returns how many were acknowledged.
    pub fn acknowledge(&self) -> usize {
        let waiting = std::mem::take(&mut self.inner.lock().awaiting_ack);
        for (_, signal) in &waiting {
            signal.ready();
        }
        waiting.len()
    }

    /// Marks the object as gone and cancels every transaction with a
    /// staged change to it.
    pub fn destroy(&self) {
        let mut inner = self.inner.lock();
        inner.destroyed = true;
        inner.awaiting_ack.clear();
        for (_, signal) in inner.outstanding.drain(..) {
            signal.cancel();
        }
        trace!(object = %inner.object, "staged object destroyed");
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Staged<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Staged")
            .field("object", &inner.object)
            .field("current", &inner.current)
            .field("pending", &inner.pending)
            .field("committed", &inner.committed)
            .field("destroyed", &inner.destroyed)
            .finish()
    }
}

/// Instruction setting the value of a [`Staged`] object.
pub struct SetValue<T> {
    staged: Staged<T>,
    object: ObjectId,
    serial: u64,
    value: T,
    readiness: Readiness,
    applied: bool,
}

impl<T: Clone + 'static> SetValue<T> {
    /// Returns the value this instruction sets.
    pub fn value(&self) -> &T {
        &self.value
    }
}

impl<T: Clone + 'static> Instruction for SetValue<T> {
    fn object(&self) -> &ObjectId {
        &self.object
    }

    fn set_pending(&mut self, signal: &CommitSignal) {
        let mut inner = self.staged.inner.lock();
        if inner.destroyed {
            signal.cancel();
            return;
        }
        inner.pending = Some((self.serial, self.value.clone()));
        inner.outstanding.push((self.serial, signal.clone()));
    }

    fn commit(&mut self, signal: &CommitSignal) {
        let mut inner = self.staged.inner.lock();
        if inner.destroyed {
            signal.cancel();
            return;
        }
        inner.committed = Some((self.serial, self.value.clone()));
        match self.readiness {
            Readiness::Immediate => signal.ready(),
            Readiness::Acknowledged => inner.awaiting_ack.push((self.serial, signal.clone())),
        }
    }

    fn apply(&mut self) {
        let mut inner = self.staged.inner.lock();
        inner.current = self.value.clone();
        inner.withdraw(self.serial);
        self.applied = true;
    }
}

impl<T> Drop for SetValue<T> {
    fn drop(&mut self) {
        if !self.applied {
            self.staged.inner.lock().withdraw(self.serial);
        }
    }
}
