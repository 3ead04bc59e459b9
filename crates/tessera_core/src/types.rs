//! Core type definitions for tessera.

use std::borrow::Borrow;
use std::fmt;

/// Unique identifier for a submitted transaction.
///
/// Transaction IDs are assigned by the manager once the expansion loop has
/// settled. They are monotonically increasing and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Identifier of the object an instruction changes (a window handle, an
/// output name, ...).
///
/// Two instructions with equal object IDs collide: they may never be part
/// of two different in-flight transactions at once.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(String);

impl ObjectId {
    /// Creates an object ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for ObjectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for ObjectId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// How a committed transaction finished.
///
/// This is the payload of the `done` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Every instruction reported ready before the timeout.
    Ready,
    /// An instruction cancelled; nothing will be applied.
    Cancelled,
    /// The timeout elapsed first. Still applied: this is forced completion,
    /// not a failure.
    TimedOut,
}

impl Outcome {
    /// Returns true if the transaction should be applied after this outcome.
    #[must_use]
    pub const fn is_applicable(self) -> bool {
        matches!(self, Outcome::Ready | Outcome::TimedOut)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Outcome::Ready => "ready",
            Outcome::Cancelled => "cancelled",
            Outcome::TimedOut => "timed-out",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn transaction_id_ordering() {
        let t1 = TransactionId::new(1);
        let t2 = TransactionId::new(2);
        assert!(t1 < t2);
    }

    #[test]
    fn transaction_id_display() {
        assert_eq!(format!("{}", TransactionId::new(42)), "txn:42");
    }

    #[test]
    fn object_id_lookup_by_str() {
        let set: BTreeSet<ObjectId> = ["b", "a"].into_iter().map(ObjectId::from).collect();
        assert!(set.contains("a"));
        assert_eq!(set.iter().next().unwrap().as_str(), "a");
    }

    #[test]
    fn applicable_outcomes() {
        assert!(Outcome::Ready.is_applicable());
        assert!(Outcome::TimedOut.is_applicable());
        assert!(!Outcome::Cancelled.is_applicable());
    }
}
