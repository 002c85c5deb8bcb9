//! Remote persistence for profiles and their meal records.

use anyhow::{bail, Result};
use numa_contracts::meals::MealAnalysis;
use numa_contracts::profile::Profile;

mod firestore;
mod memory;

pub use firestore::{FirestoreConfig, FirestoreDocumentStore};
pub use memory::MemoryDocumentStore;

pub const USERS_COLLECTION: &str = "users";
pub const MEALS_COLLECTION: &str = "meals";

/// One document per profile, keyed by profile id; meals live in a
/// sub-collection under that document. Writes are upserts, last write wins.
pub trait DocumentStore: Send {
    fn name(&self) -> &str;

    /// `Ok(None)` when no document exists for `profile_id`.
    fn load_profile(&self, profile_id: &str) -> Result<Option<Profile>>;

    fn save_profile(&self, profile: &Profile) -> Result<()>;

    fn save_meal(&self, profile_id: &str, meal: &MealAnalysis) -> Result<()>;

    fn list_meals(&self, profile_id: &str) -> Result<Vec<MealAnalysis>>;
}

impl<S: DocumentStore + ?Sized> DocumentStore for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn load_profile(&self, profile_id: &str) -> Result<Option<Profile>> {
        (**self).load_profile(profile_id)
    }

    fn save_profile(&self, profile: &Profile) -> Result<()> {
        (**self).save_profile(profile)
    }

    fn save_meal(&self, profile_id: &str, meal: &MealAnalysis) -> Result<()> {
        (**self).save_meal(profile_id, meal)
    }

    fn list_meals(&self, profile_id: &str) -> Result<Vec<MealAnalysis>> {
        (**self).list_meals(profile_id)
    }
}

/// Stand-in used when no remote store is configured; every call fails, so
/// profiles stay local-only.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledDocumentStore;

impl DocumentStore for DisabledDocumentStore {
    fn name(&self) -> &str {
        "disabled"
    }

    fn load_profile(&self, _profile_id: &str) -> Result<Option<Profile>> {
        bail!("remote document store is not configured")
    }

    fn save_profile(&self, _profile: &Profile) -> Result<()> {
        bail!("remote document store is not configured")
    }

    fn save_meal(&self, _profile_id: &str, _meal: &MealAnalysis) -> Result<()> {
        bail!("remote document store is not configured")
    }

    fn list_meals(&self, _profile_id: &str) -> Result<Vec<MealAnalysis>> {
        bail!("remote document store is not configured")
    }
}
