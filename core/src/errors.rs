//! Error taxonomy of the core.
//!
//! Conflict and not-found variants are *expected outcomes*: they report which
//! invariant blocked a transition (and who holds it) so the façade can show
//! the guard a useful message. They are never retried internally — retrying
//! without new information reproduces the same conflict. Only the `Storage`
//! and `Directory` variants describe collaborator failures a caller may retry
//! with backoff.

use chrono::{DateTime, Utc};

use warden_store::StoreError;
use warden_types::{CheckpointId, CheckpointOwner, PersonId};

use crate::directory::DirectoryError;

/// Rejections and failures of the checkpoint session registry.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Another guard's active session owns the checkpoint. Carries the
    /// owner's identity and session timestamps for display.
    #[error("checkpoint {checkpoint_id} is controlled by guard {}", .owner.guard_id)]
    CheckpointOccupied {
        checkpoint_id: CheckpointId,
        owner: CheckpointOwner,
    },

    /// The session token does not name an active session: it was closed by
    /// the guard, by the guard restarting elsewhere, or by an administrator.
    #[error("session is expired or unknown")]
    Expired,

    /// The referenced session does not exist (or was already closed, for the
    /// idempotent close path).
    #[error("session not found")]
    NotFound,

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Rejections and failures of the presence ledger.
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    /// The person already has an open stay; the new entry is refused, never
    /// overwritten.
    #[error("person {person_id} is already inside since {since} (entered via {checkpoint_id})")]
    AlreadyInside {
        person_id: PersonId,
        checkpoint_id: CheckpointId,
        since: DateTime<Utc>,
    },

    /// The person has no open stay to close.
    #[error("person {person_id} is not inside the facility")]
    NotInside { person_id: PersonId },

    /// The person directory has no record of this identifier.
    #[error("person {person_id} is not known to the directory")]
    PersonUnknown { person_id: PersonId },

    /// The person is known but their enrollment lapsed.
    #[error("person {person_id} is not currently enrolled")]
    NotEnrolled { person_id: PersonId },

    #[error("person directory unavailable: {0}")]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Either side of an access-event application.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Presence(#[from] PresenceError),
}
