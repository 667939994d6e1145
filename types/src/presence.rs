//! Presence entities: who is inside the facility, and completed stays.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CheckpointId, GuardId, PersonId};

/// Faculty and school codes a person belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affiliation {
    pub faculty: String,
    pub school: String,
}

/// Reference data for one person, as returned by the person directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonProfile {
    pub id: PersonId,
    pub name: String,
    pub affiliation: Affiliation,
    /// False for people whose enrollment lapsed; they remain known to the
    /// directory but may not enter.
    pub enrolled: bool,
}

/// One person's current or completed stay inside the facility.
///
/// # Invariants
///
/// - At most one record with `inside = true` exists per person at any instant
///   (enforced by the store schema).
/// - `exited_at`, `exit_checkpoint`, `exit_guard`, and `dwell_ms` are set
///   together, exactly once, when the stay closes; the record is immutable
///   afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub person_id: PersonId,
    pub person_name: String,
    pub affiliation: Affiliation,
    pub entered_at: DateTime<Utc>,
    pub exited_at: Option<DateTime<Utc>>,
    pub entry_checkpoint: CheckpointId,
    pub exit_checkpoint: Option<CheckpointId>,
    pub entry_guard: GuardId,
    pub exit_guard: Option<GuardId>,
    pub inside: bool,
    /// Milliseconds between entry and exit; never negative.
    pub dwell_ms: Option<i64>,
}

impl PresenceRecord {
    /// Elapsed time between entry and exit, if the stay has closed.
    #[must_use]
    pub fn dwell(&self) -> Option<TimeDelta> {
        self.dwell_ms.map(TimeDelta::milliseconds)
    }
}
