//! Access-event coordination.
//!
//! The composition point a request façade calls: validate that the event's
//! session token owns the checkpoint it arrived from, then apply the
//! person's transition in the requested direction. Recording any
//! manual-override audit trail around a rejected event stays with the
//! caller.

use std::sync::Arc;

use warden_config::Settings;
use warden_store::{AccessStore, StoreError};
use warden_types::{AccessEvent, Direction, PresenceRecord};

use crate::directory::StoreDirectory;
use crate::errors::AccessError;
use crate::ledger::PresenceLedger;
use crate::registry::CheckpointRegistry;

/// Registry + ledger behind one entry point for whole access events.
pub struct AccessService {
    registry: CheckpointRegistry,
    ledger: PresenceLedger,
}

impl AccessService {
    #[must_use]
    pub fn new(registry: CheckpointRegistry, ledger: PresenceLedger) -> Self {
        Self { registry, ledger }
    }

    /// Build a service over the configured database, with the bundled
    /// `people` reference table as the person directory.
    pub fn open(settings: &Settings) -> Result<Self, StoreError> {
        let store = Arc::new(AccessStore::open(&settings.database_path)?);
        let directory = Arc::new(StoreDirectory::new(Arc::clone(&store)));
        Ok(Self::new(
            CheckpointRegistry::new(Arc::clone(&store)),
            PresenceLedger::new(store, directory),
        ))
    }

    #[must_use]
    pub fn registry(&self) -> &CheckpointRegistry {
        &self.registry
    }

    #[must_use]
    pub fn ledger(&self) -> &PresenceLedger {
        &self.ledger
    }

    /// Apply one access event end to end.
    ///
    /// The guard attributed to the transition is taken from the validated
    /// session, not from the event, so a stolen or stale token cannot record
    /// crossings in another guard's name.
    pub fn apply(&self, event: &AccessEvent) -> Result<PresenceRecord, AccessError> {
        let session = self
            .registry
            .validate_owner(&event.token, &event.checkpoint_id)?;

        let record = match event.direction {
            Direction::Enter => self.ledger.record_entry(
                &event.person_id,
                &event.checkpoint_id,
                &session.guard_id,
                event.at,
            )?,
            Direction::Exit => self.ledger.record_exit(
                &event.person_id,
                &event.checkpoint_id,
                &session.guard_id,
                event.at,
            )?,
        };
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_builds_a_working_service_from_settings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = Settings {
            database_path: dir.path().join("warden.db"),
            ..Settings::default()
        };

        let service = AccessService::open(&settings).expect("open");
        assert!(service.registry().list_active().expect("active").is_empty());
        assert!(service.ledger().list_inside().expect("inside").is_empty());
    }
}

