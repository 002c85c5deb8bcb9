use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use numa_contracts::events::{payload, EventPayload, EventWriter};
use numa_contracts::meals::MealAnalysis;
use numa_contracts::profile::{OnboardingStatus, OnboardingUpdate, Profile};
use numa_contracts::store::{keys, LocalStore};
use serde_json::json;

use crate::documents::DocumentStore;

/// Owns the current profile and mirrors it to the local store and the
/// remote document store.
///
/// Local writes always happen first and are never rolled back; remote
/// failures are logged and returned so the caller can carry on. Last write
/// wins on the next successful sync.
pub struct ProfileStore<D: DocumentStore> {
    local: LocalStore,
    remote: D,
    events: Option<EventWriter>,
    current: Option<Profile>,
}

impl<D: DocumentStore> ProfileStore<D> {
    pub fn new(local: LocalStore, remote: D) -> Self {
        Self {
            local,
            remote,
            events: None,
            current: None,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn current_profile(&self) -> Option<&Profile> {
        self.current.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.current.is_some()
    }

    /// Loads the stored profile (remote first, local fields as fallback) or
    /// creates a new one.
    pub fn initialize(&mut self) -> &Profile {
        let profile = match self.local.get_str(keys::USER_ID) {
            Some(profile_id) => match self.remote.load_profile(&profile_id) {
                Ok(Some(profile)) => {
                    log::info!("profile {profile_id} loaded from {}", self.remote.name());
                    profile
                }
                Ok(None) => {
                    log::warn!(
                        "profile {profile_id} not found in {}; using local data",
                        self.remote.name()
                    );
                    self.profile_from_local(profile_id)
                }
                Err(err) => {
                    log::error!("failed to load profile {profile_id}: {err:#}; using local data");
                    self.profile_from_local(profile_id)
                }
            },
            None => self.create_profile(),
        };
        self.current.insert(profile)
    }

    /// Merges the provided fields, writes locally, then upserts remotely.
    ///
    /// `Err` reports a failed remote step; the in-memory and local copies keep
    /// the merged fields either way.
    pub fn save_onboarding_data(&mut self, update: &OnboardingUpdate) -> Result<()> {
        if self.current.is_none() {
            self.initialize();
            bail!("profile was not initialized; a profile has been loaded, retry the save");
        }
        let profile = self
            .current
            .as_mut()
            .ok_or_else(|| anyhow!("profile not initialized"))?;
        profile.apply(update);
        let snapshot = profile.clone();

        self.write_local(&snapshot);
        self.sync_remote("onboarding data")
    }

    pub fn complete_onboarding(&mut self) -> Result<()> {
        let profile = self
            .current
            .as_mut()
            .ok_or_else(|| anyhow!("cannot complete onboarding: profile not initialized"))?;
        profile.onboarding_complete = true;
        let snapshot = profile.clone();

        self.write_local(&snapshot);
        self.sync_remote("onboarding completion")
    }

    /// Pure read: which required answers are still missing.
    pub fn verify_onboarding_data(&self) -> OnboardingStatus {
        match &self.current {
            Some(profile) => profile.onboarding_status(),
            None => OnboardingStatus::not_initialized(),
        }
    }

    /// Upserts a meal record under the current profile. Never touches the
    /// in-memory profile.
    pub fn save_meal_analysis(&self, meal: &MealAnalysis) -> Result<()> {
        let profile_id = self.current_id()?;
        match self.remote.save_meal(profile_id, meal) {
            Ok(()) => {
                log::info!("meal {} saved for profile {profile_id}", meal.id);
                self.journal(
                    "meal_saved",
                    payload([
                        ("profile_id", json!(profile_id)),
                        ("meal_id", json!(meal.id)),
                    ]),
                );
                Ok(())
            }
            Err(err) => {
                log::error!("failed to save meal {}: {err:#}", meal.id);
                self.journal(
                    "meal_save_failed",
                    payload([
                        ("profile_id", json!(profile_id)),
                        ("meal_id", json!(meal.id)),
                        ("error", json!(format!("{err:#}"))),
                    ]),
                );
                Err(err.context("failed to save meal analysis"))
            }
        }
    }

    /// All meals of the current profile, newest first.
    pub fn get_user_meals(&self) -> Result<Vec<MealAnalysis>> {
        let profile_id = self.current_id()?;
        let mut meals = self
            .remote
            .list_meals(profile_id)
            .with_context(|| format!("failed to load meals for profile {profile_id}"))?;
        meals.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        log::info!("loaded {} meals for profile {profile_id}", meals.len());
        Ok(meals)
    }

    pub fn describe_profile(&self) -> String {
        match &self.current {
            Some(profile) => profile.describe(),
            None => "No user data available".to_string(),
        }
    }

    /// Forgets the profile locally; the next `initialize` starts a new one.
    pub fn reset(&mut self) -> Result<()> {
        for key in keys::ALL {
            self.local
                .remove(key)
                .with_context(|| format!("failed to clear local key {key}"))?;
        }
        self.current = None;
        log::info!("local profile data cleared");
        Ok(())
    }

    pub fn shutdown(mut self) -> Result<()> {
        self.local.flush().context("failed to flush local store")
    }

    fn current_id(&self) -> Result<&str> {
        self.current
            .as_ref()
            .map(|profile| profile.id.as_str())
            .ok_or_else(|| anyhow!("profile not initialized"))
    }

    fn create_profile(&mut self) -> Profile {
        let profile = Profile::new();
        if let Err(err) = self.local.set(keys::USER_ID, profile.id.as_str()) {
            log::error!("failed to persist new profile id locally: {err:#}");
        }
        match self.remote.save_profile(&profile) {
            Ok(()) => {
                log::info!("new profile {} created in {}", profile.id, self.remote.name());
                self.journal("profile_synced", payload([("profile_id", json!(profile.id))]));
            }
            Err(err) => {
                log::error!("failed to create profile {} remotely: {err:#}", profile.id);
                self.journal(
                    "profile_sync_failed",
                    payload([
                        ("profile_id", json!(profile.id)),
                        ("error", json!(format!("{err:#}"))),
                    ]),
                );
            }
        }
        profile
    }

    fn profile_from_local(&mut self, profile_id: String) -> Profile {
        let mut profile = Profile::with_id(profile_id);
        profile.goal = self.local_choice(keys::GOAL);
        profile.current_weight = self.local.get_f64(keys::CURRENT_WEIGHT);
        profile.target_weight = self.local.get_f64(keys::TARGET_WEIGHT);
        profile.height = self.local.get_i64(keys::HEIGHT);
        profile.age = self.local.get_i64(keys::AGE);
        profile.gender = self.local_choice(keys::GENDER);
        profile.activity_level = self.local_choice(keys::ACTIVITY_LEVEL);
        profile.onboarding_complete = self.local.get_bool(keys::ONBOARDING_COMPLETE);
        profile
    }

    fn local_choice<T: std::str::FromStr>(&mut self, key: &str) -> Option<T>
    where
        T::Err: std::fmt::Display,
    {
        let raw = self.local.get_str(key)?;
        raw.parse()
            .map_err(|err| log::warn!("ignoring local {key}: {err}"))
            .ok()
    }

    // Absent fields keep whatever was stored before; the flag is always written.
    fn write_local(&mut self, profile: &Profile) {
        let mut writes: Vec<(&str, serde_json::Value)> = Vec::new();
        if let Some(goal) = profile.goal {
            writes.push((keys::GOAL, json!(goal.as_str())));
        }
        if let Some(weight) = profile.current_weight {
            writes.push((keys::CURRENT_WEIGHT, json!(weight)));
        }
        if let Some(weight) = profile.target_weight {
            writes.push((keys::TARGET_WEIGHT, json!(weight)));
        }
        if let Some(height) = profile.height {
            writes.push((keys::HEIGHT, json!(height)));
        }
        if let Some(age) = profile.age {
            writes.push((keys::AGE, json!(age)));
        }
        if let Some(gender) = profile.gender {
            writes.push((keys::GENDER, json!(gender.as_str())));
        }
        if let Some(level) = profile.activity_level {
            writes.push((keys::ACTIVITY_LEVEL, json!(level.as_str())));
        }
        writes.push((keys::ONBOARDING_COMPLETE, json!(profile.onboarding_complete)));

        for (key, value) in writes {
            if let Err(err) = self.local.set(key, value) {
                log::error!("failed to write local {key}: {err:#}");
            }
        }
    }

    fn sync_remote(&mut self, what: &str) -> Result<()> {
        let profile = self
            .current
            .as_mut()
            .ok_or_else(|| anyhow!("profile not initialized"))?;
        profile.updated_at = Utc::now();
        let snapshot = profile.clone();

        match self.remote.save_profile(&snapshot) {
            Ok(()) => {
                log::info!("{what} saved for profile {}", snapshot.id);
                self.journal(
                    "profile_synced",
                    payload([("profile_id", json!(snapshot.id)), ("what", json!(what))]),
                );
                Ok(())
            }
            Err(err) => {
                log::error!("failed to save {what} for profile {}: {err:#}", snapshot.id);
                self.journal(
                    "profile_sync_failed",
                    payload([
                        ("profile_id", json!(snapshot.id)),
                        ("what", json!(what)),
                        ("error", json!(format!("{err:#}"))),
                    ]),
                );
                Err(err.context(format!("failed to save {what} remotely")))
            }
        }
    }

    fn journal(&self, event_type: &str, event: EventPayload) {
        if let Some(events) = &self.events {
            events.record(event_type, event);
        }
    }
}
