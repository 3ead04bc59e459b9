//! Transactions and their manager.
//!
//! tessera transactions give all-or-nothing visibility for a group of
//! instructions:
//! - **Staging**: every instruction records its target before any commits
//! - **Atomic visibility**: all instructions are applied together, or none
//! - **Bounded waiting**: a timeout forces completion if a participant stalls
//! - **Serialization**: no two in-flight transactions touch the same object

mod manager;
mod state;

pub use manager::{DoneListener, PendingListener, TransactionManager};
pub use state::{Transaction, TransactionState};
