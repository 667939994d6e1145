//! Presence ledger.
//!
//! Owns the per-person state machine `Outside → Inside → Outside`. Entry and
//! exit both go through the store's conditional transitions, so interleaved
//! requests can only ever produce a strict alternation: a retried entry on
//! someone already inside reports [`PresenceError::AlreadyInside`], a retried
//! exit reports [`PresenceError::NotInside`], and no duplicate record is ever
//! written.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};

use warden_store::{AccessStore, StoreError, Transition};
use warden_types::{CheckpointId, Direction, GuardId, PersonId, PresenceRecord};

use crate::directory::PersonDirectory;
use crate::errors::PresenceError;

/// Entry/exit state machine and presence queries.
pub struct PresenceLedger {
    store: Arc<AccessStore>,
    directory: Arc<dyn PersonDirectory>,
}

impl PresenceLedger {
    #[must_use]
    pub fn new(store: Arc<AccessStore>, directory: Arc<dyn PersonDirectory>) -> Self {
        Self { store, directory }
    }

    /// Record a person entering through `checkpoint_id`.
    ///
    /// The directory populates name and affiliation; unknown or unenrolled
    /// people are refused before any write. The insert itself enforces the
    /// sole-inside invariant, so of two racing entries exactly one creates
    /// the record and the other learns when and where the person already
    /// entered.
    pub fn record_entry(
        &self,
        person_id: &PersonId,
        checkpoint_id: &CheckpointId,
        guard_id: &GuardId,
        at: DateTime<Utc>,
    ) -> Result<PresenceRecord, PresenceError> {
        let profile = self
            .directory
            .find_person(person_id)?
            .ok_or_else(|| PresenceError::PersonUnknown {
                person_id: person_id.clone(),
            })?;
        if !profile.enrolled {
            return Err(PresenceError::NotEnrolled {
                person_id: person_id.clone(),
            });
        }

        let record = PresenceRecord {
            person_id: person_id.clone(),
            person_name: profile.name,
            affiliation: profile.affiliation,
            entered_at: at,
            exited_at: None,
            entry_checkpoint: checkpoint_id.clone(),
            exit_checkpoint: None,
            entry_guard: guard_id.clone(),
            exit_guard: None,
            inside: true,
            dwell_ms: None,
        };

        match self.store.open_presence(&record)? {
            Transition::Applied => {
                tracing::info!(
                    person_id = person_id.as_str(),
                    checkpoint_id = checkpoint_id.as_str(),
                    "entry recorded"
                );
                Ok(record)
            }
            Transition::Conflict | Transition::NotFound => {
                let current = self.store.inside_record(person_id)?.ok_or_else(|| {
                    StoreError::Corrupt(
                        "entry conflicted but no inside record exists".to_string(),
                    )
                })?;
                Err(PresenceError::AlreadyInside {
                    person_id: person_id.clone(),
                    checkpoint_id: current.entry_checkpoint,
                    since: current.entered_at,
                })
            }
        }
    }

    /// Record a person leaving through `checkpoint_id`.
    ///
    /// Closes the open stay in one conditional statement, stamping the exit
    /// side and computing dwell = exit − entry. No directory lookup: someone
    /// inside must always be allowed out, even if their reference data
    /// vanished since entry.
    pub fn record_exit(
        &self,
        person_id: &PersonId,
        checkpoint_id: &CheckpointId,
        guard_id: &GuardId,
        at: DateTime<Utc>,
    ) -> Result<PresenceRecord, PresenceError> {
        match self
            .store
            .close_presence(person_id, checkpoint_id, guard_id, at)?
        {
            Some(record) => {
                tracing::info!(
                    person_id = person_id.as_str(),
                    checkpoint_id = checkpoint_id.as_str(),
                    dwell_ms = record.dwell_ms,
                    "exit recorded"
                );
                Ok(record)
            }
            None => Err(PresenceError::NotInside {
                person_id: person_id.clone(),
            }),
        }
    }

    /// Everyone currently inside, oldest entry first. Snapshot semantics.
    pub fn list_inside(&self) -> Result<Vec<PresenceRecord>, PresenceError> {
        Ok(self.store.inside_records()?)
    }

    /// Inside records whose stay has lasted at least `threshold`.
    ///
    /// Pure read-side filter, no state change; the default policy threshold
    /// lives in the configuration (8 hours).
    pub fn list_overdue(&self, threshold: TimeDelta) -> Result<Vec<PresenceRecord>, PresenceError> {
        Ok(self.store.overdue_records(Utc::now() - threshold)?)
    }

    /// The direction a checkpoint UI should preselect for this person:
    /// `Exit` while they are inside, `Enter` otherwise (including people the
    /// ledger has never seen).
    pub fn suggested_direction(&self, person_id: &PersonId) -> Result<Direction, PresenceError> {
        if self.store.inside_record(person_id)?.is_some() {
            Ok(Direction::Exit)
        } else {
            Ok(Direction::Enter)
        }
    }
}
