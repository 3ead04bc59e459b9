//! # tessera core
//!
//! Atomic state commits for objects living on one event loop.
//!
//! A [`Transaction`] groups [`Instruction`]s, each changing one object.
//! The [`TransactionManager`] lets collaborators extend a transaction
//! until nothing more is added, stages it, commits it when its objects are
//! free, waits for every instruction to report readiness (bounded by a
//! timeout), and applies it. Either every change becomes visible together,
//! or none does.
//!
//! This crate provides:
//! - The instruction contract and completion signals
//! - The transaction state machine and merge rules
//! - The manager: expansion loop, ID assignment, conflict serialization
//! - Lifecycle events and counters
//! - [`Staged`] values, a ready-made participant for property changes

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod error;
mod events;
mod instruction;
mod registry;
mod signal;
mod staged;
mod stats;
mod transaction;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, DEFAULT_COMMIT_TIMEOUT};
pub use error::{TxnError, TxnResult};
pub use events::{EventFeed, EventKind, TransactionEvent};
pub use instruction::Instruction;
pub use registry::{ObjectRegistry, ParticipantMap, TransactionParticipant};
pub use signal::{CommitSignal, Completion};
pub use staged::{SetValue, Staged};
pub use stats::{StatsSnapshot, TransactionStats};
pub use transaction::{DoneListener, PendingListener, Transaction, TransactionManager, TransactionState};
pub use types::{ObjectId, Outcome, TransactionId};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
