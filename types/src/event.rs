//! The access-event tuple that drives both state machines.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CheckpointId, PersonId, SessionToken};

/// Which way a person is crossing a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Enter,
    Exit,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enter => write!(f, "enter"),
            Self::Exit => write!(f, "exit"),
        }
    }
}

/// One crossing attempt as reported by a checkpoint device.
///
/// Transient input, never persisted by the core: the registry validates the
/// token's checkpoint ownership, then the ledger applies the transition for
/// `person_id` in the given `direction` at time `at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessEvent {
    pub person_id: PersonId,
    pub checkpoint_id: CheckpointId,
    pub token: SessionToken,
    pub direction: Direction,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Direction::Enter).expect("serialize"),
            "\"enter\""
        );
        let back: Direction = serde_json::from_str("\"exit\"").expect("deserialize");
        assert_eq!(back, Direction::Exit);
    }
}
