//! # tessera testkit
//!
//! Test utilities for tessera.
//!
//! This crate provides:
//! - Scripted instructions that journal every lifecycle hook
//! - A manager wired to a manual clock
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tessera_testkit::prelude::*;
//!
//! #[test]
//! fn commits_and_applies() {
//!     let journal = Journal::new();
//!     let mut tm = TestManager::new();
//!     tm.submit(transaction_of(["a", "b"], &journal)).unwrap();
//!     tm.advance_ms(0);
//!     assert_eq!(journal.count(Hook::Apply), 2);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
