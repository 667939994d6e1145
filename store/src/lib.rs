//! Durable state store for guard sessions and presence records.
//!
//! This crate is the storage collaborator the core components talk to. It
//! provides:
//! - One SQLite database holding guard sessions, presence records, and the
//!   person reference table
//! - The conditional-transition primitive: every state change is a single
//!   atomic statement whose expected-state predicate lives in the database
//!   (a `WHERE` clause, or a partial unique index for create-if-absent)
//! - Secure database file handling (owner-only permissions)
//!
//! Correctness under concurrent callers comes from the storage engine, not
//! from in-process locks: among any set of racing transitions on the same
//! key, exactly one observes [`Transition::Applied`].

mod error;
mod fs_util;
mod store;
mod time;
mod transition;

pub use error::StoreError;
pub use store::{AccessStore, ClaimOutcome};
pub use transition::Transition;
