//! The person-directory seam.
//!
//! Reference data (names, affiliations, enrollment) belongs to an external
//! collaborator; the ledger only needs a lookup. [`StoreDirectory`] reads the
//! reference table that ships in the same database; [`StaticDirectory`] is an
//! in-memory fixture for tests and demos.

use std::collections::HashMap;
use std::sync::Arc;

use warden_store::{AccessStore, StoreError};
use warden_types::{PersonId, PersonProfile};

/// The directory collaborator was unreachable or failed. Retryable, unlike
/// a definitive "person unknown" answer.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct DirectoryError {
    message: String,
}

impl DirectoryError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<StoreError> for DirectoryError {
    fn from(e: StoreError) -> Self {
        Self::new(e.to_string())
    }
}

/// Person reference lookup. `Ok(None)` is a definitive "unknown person";
/// `Err` means the collaborator itself failed.
pub trait PersonDirectory: Send + Sync {
    fn find_person(&self, person_id: &PersonId) -> Result<Option<PersonProfile>, DirectoryError>;
}

/// Directory backed by the `people` reference table in the access store.
pub struct StoreDirectory {
    store: Arc<AccessStore>,
}

impl StoreDirectory {
    #[must_use]
    pub fn new(store: Arc<AccessStore>) -> Self {
        Self { store }
    }
}

impl PersonDirectory for StoreDirectory {
    fn find_person(&self, person_id: &PersonId) -> Result<Option<PersonProfile>, DirectoryError> {
        Ok(self.store.find_person(person_id)?)
    }
}

/// Fixed in-memory directory.
#[derive(Default)]
pub struct StaticDirectory {
    people: HashMap<PersonId, PersonProfile>,
}

impl StaticDirectory {
    #[must_use]
    pub fn new(people: impl IntoIterator<Item = PersonProfile>) -> Self {
        Self {
            people: people
                .into_iter()
                .map(|profile| (profile.id.clone(), profile))
                .collect(),
        }
    }
}

impl PersonDirectory for StaticDirectory {
    fn find_person(&self, person_id: &PersonId) -> Result<Option<PersonProfile>, DirectoryError> {
        Ok(self.people.get(person_id).cloned())
    }
}
