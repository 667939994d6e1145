//! The concurrency-sensitive core of the campus access-control service.
//!
//! Two components, both built on the store's conditional-transition
//! primitive:
//!
//! - [`CheckpointRegistry`] — guard-session lifecycle and checkpoint
//!   exclusivity (`Unowned → Owned(guard) → Unowned` per checkpoint)
//! - [`PresenceLedger`] — the per-person entry/exit state machine
//!   (`Outside → Inside → Outside`) and derived dwell time
//!
//! [`AccessService`] composes them with a [`PersonDirectory`] and applies
//! whole access events; the network façade on top of it is not part of this
//! crate. Components hold only an `Arc` to the store — no global state, no
//! in-process lock spanning storage calls.

mod access;
mod directory;
mod errors;
mod ledger;
mod registry;

pub use access::AccessService;
pub use directory::{DirectoryError, PersonDirectory, StaticDirectory, StoreDirectory};
pub use errors::{AccessError, PresenceError, SessionError};
pub use ledger::PresenceLedger;
pub use registry::{AdminProof, CheckpointRegistry};
