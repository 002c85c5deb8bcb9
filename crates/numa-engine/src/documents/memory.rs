use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use numa_contracts::meals::MealAnalysis;
use numa_contracts::profile::Profile;

use super::DocumentStore;

#[derive(Debug, Default)]
struct Documents {
    profiles: BTreeMap<String, Profile>,
    meals: BTreeMap<String, BTreeMap<String, MealAnalysis>>,
}

/// In-process document store. Clones share state, and `set_offline(true)`
/// makes every call fail until switched back.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    documents: Arc<Mutex<Documents>>,
    offline: Arc<AtomicBool>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn profile(&self, profile_id: &str) -> Option<Profile> {
        self.lock().ok()?.profiles.get(profile_id).cloned()
    }

    pub fn profile_count(&self) -> usize {
        self.lock().map(|docs| docs.profiles.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Documents>> {
        self.documents
            .lock()
            .map_err(|_| anyhow!("memory document store lock poisoned"))
    }

    fn online(&self) -> Result<MutexGuard<'_, Documents>> {
        if self.offline.load(Ordering::SeqCst) {
            bail!("memory document store is offline");
        }
        self.lock()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn load_profile(&self, profile_id: &str) -> Result<Option<Profile>> {
        Ok(self.online()?.profiles.get(profile_id).cloned())
    }

    fn save_profile(&self, profile: &Profile) -> Result<()> {
        self.online()?
            .profiles
            .insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    fn save_meal(&self, profile_id: &str, meal: &MealAnalysis) -> Result<()> {
        self.online()?
            .meals
            .entry(profile_id.to_string())
            .or_default()
            .insert(meal.id.clone(), meal.clone());
        Ok(())
    }

    fn list_meals(&self, profile_id: &str) -> Result<Vec<MealAnalysis>> {
        Ok(self
            .online()?
            .meals
            .get(profile_id)
            .map(|meals| meals.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_switch_fails_calls() -> Result<()> {
        let store = MemoryDocumentStore::new();
        let profile = Profile::with_id("p1");
        store.save_profile(&profile)?;

        store.set_offline(true);
        assert!(store.load_profile("p1").is_err());
        assert!(store.list_meals("p1").is_err());

        store.set_offline(false);
        assert_eq!(store.load_profile("p1")?, Some(profile));
        assert_eq!(store.load_profile("p2")?, None);
        Ok(())
    }

    #[test]
    fn clones_share_documents() -> Result<()> {
        let store = MemoryDocumentStore::new();
        let clone = store.clone();
        clone.save_profile(&Profile::with_id("p1"))?;
        assert_eq!(store.profile_count(), 1);
        Ok(())
    }
}
