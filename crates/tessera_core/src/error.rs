//! Error types for tessera core.

use crate::transaction::TransactionState;
use crate::types::TransactionId;
use thiserror::Error;

/// Result type for core operations.
pub type TxnResult<T> = Result<T, TxnError>;

/// Errors that can occur when driving transactions.
///
/// All of these are programmer errors (misuse of the state machine) or
/// runaway collaborators. Instruction cancellation and timeouts are not
/// errors; they are reported as an [`Outcome`](crate::Outcome).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxnError {
    /// Operation not permitted in the transaction's current state.
    #[error("cannot {operation} a transaction in state {state}")]
    InvalidState {
        /// The attempted operation.
        operation: &'static str,
        /// State the transaction was in.
        state: TransactionState,
    },

    /// Merge legality violated.
    #[error("cannot merge a {source_state} transaction into a {target} transaction")]
    MergeRejected {
        /// State of the transaction being merged into.
        target: TransactionState,
        /// State of the transaction being merged away.
        source_state: TransactionState,
    },

    /// No transaction with this ID is waiting to be applied.
    #[error("unknown transaction {0}")]
    UnknownTransaction(TransactionId),

    /// Collaborators kept adding instructions past the configured bound.
    #[error("expansion loop did not settle after {rounds} rounds")]
    ExpansionLimit {
        /// Number of rounds that were run.
        rounds: usize,
    },
}

impl TxnError {
    /// Creates an invalid state error.
    pub fn invalid_state(operation: &'static str, state: TransactionState) -> Self {
        Self::InvalidState { operation, state }
    }

    /// Creates a merge rejected error.
    pub fn merge_rejected(target: TransactionState, source_state: TransactionState) -> Self {
        Self::MergeRejected {
            target,
            source_state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_message() {
        let err = TxnError::invalid_state("apply", TransactionState::Committed);
        assert_eq!(
            err.to_string(),
            "cannot apply a transaction in state committed"
        );
    }

    #[test]
    fn merge_rejected_message() {
        let err = TxnError::merge_rejected(TransactionState::New, TransactionState::Pending);
        assert_eq!(
            err.to_string(),
            "cannot merge a pending transaction into a new transaction"
        );
    }
}
