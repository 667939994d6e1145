//! Guard-session entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CheckpointId, GuardId, SessionToken};

/// Opaque descriptor of the device a guard signed in from (platform, device
/// id, app version, ...). The core attaches it to the session verbatim and
/// never inspects it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceInfo(pub serde_json::Value);

impl DeviceInfo {
    #[must_use]
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// A time-bounded claim of checkpoint ownership by one guard.
///
/// # Invariants
///
/// - At most one session with `active = true` exists per checkpoint at any
///   instant (enforced by the store schema, not by this type).
/// - `ended_at` is `Some` exactly when `active` is false and the session was
///   closed (as opposed to never having existed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardSession {
    pub token: SessionToken,
    pub guard_id: GuardId,
    pub guard_name: String,
    pub checkpoint_id: CheckpointId,
    pub device: DeviceInfo,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub active: bool,
    pub ended_at: Option<DateTime<Utc>>,
}

impl GuardSession {
    /// The identity slice of this session shown to a guard whose claim was
    /// refused ("who is in control right now").
    #[must_use]
    pub fn owner(&self) -> CheckpointOwner {
        CheckpointOwner {
            guard_id: self.guard_id.clone(),
            guard_name: self.guard_name.clone(),
            started_at: self.started_at,
            last_activity: self.last_activity,
        }
    }
}

/// Identity and timing of the guard currently controlling a checkpoint,
/// returned with every refused claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointOwner {
    pub guard_id: GuardId,
    pub guard_name: String,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}
