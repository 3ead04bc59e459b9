//! Transaction manager statistics.
//!
//! # Usage
//!
//! ```rust,ignore
//! let manager = TransactionManager::new(Config::default(), SystemClock);
//!
//! // Submit and dispatch transactions...
//!
//! let stats = manager.stats();
//! println!("Applied: {}", stats.applied);
//! println!("Timed out: {}", stats.timed_out);
//! ```

use crate::types::Outcome;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters kept by the manager.
///
/// Counters are atomic so a shared reference can be read while the
/// manager is working. Values only ever increase.
#[derive(Debug, Default)]
pub struct TransactionStats {
    /// Transactions accepted by `submit`.
    submitted: AtomicU64,
    /// Transactions folded into an already scheduled transaction.
    merged: AtomicU64,
    /// Expansion rounds run across all submissions.
    expansion_rounds: AtomicU64,
    /// Transactions moved to COMMITTED.
    committed: AtomicU64,
    /// Transactions that finished READY.
    ready: AtomicU64,
    /// Transactions that finished TIMED_OUT.
    timed_out: AtomicU64,
    /// Transactions that finished CANCELLED.
    cancelled: AtomicU64,
    /// Transactions applied.
    applied: AtomicU64,
}

impl TransactionStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_submit(&self, rounds: usize) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        self.expansion_rounds
            .fetch_add(rounds as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_merge(&self) {
        self.merged.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_outcome(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Ready => &self.ready,
            Outcome::Cancelled => &self.cancelled,
            Outcome::TimedOut => &self.timed_out,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_apply(&self) {
        self.applied.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            merged: self.merged.load(Ordering::Relaxed),
            expansion_rounds: self.expansion_rounds.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            ready: self.ready.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`TransactionStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Transactions accepted by `submit`.
    pub submitted: u64,
    /// Transactions folded into an already scheduled transaction.
    pub merged: u64,
    /// Expansion rounds run across all submissions.
    pub expansion_rounds: u64,
    /// Transactions moved to COMMITTED.
    pub committed: u64,
    /// Transactions that finished READY.
    pub ready: u64,
    /// Transactions that finished TIMED_OUT.
    pub timed_out: u64,
    /// Transactions that finished CANCELLED.
    pub cancelled: u64,
    /// Transactions applied.
    pub applied: u64,
}

impl StatsSnapshot {
    /// Returns how many transactions reached an outcome.
    #[must_use]
    pub fn finished(&self) -> u64 {
        self.ready + self.timed_out + self.cancelled
    }
}
