//! Local profile store.
//!
//! Durable per-device slots mirroring the web client's local-storage keys: the
//! whole profile map, the active-profile pointer, navigation state, and
//! timestamped migration backups. Every mutation is a read-modify-write of the
//! whole profile map; there is no locking across processes, so concurrent
//! writers last-write-win. Single user, single process is the assumed shape.
//!
//! Corrupted slots fail closed: an unparseable document surfaces a
//! [`StoreError::Serialization`] instead of silently resetting data.

pub mod backend;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::models::{
    Profile, MAX_PROFILES_PER_DEVICE, PROFILE_NAME_MAX_LEN, PROFILE_NAME_MIN_LEN,
};
use backend::{FileBackend, MemoryBackend, StorageBackend};

pub const PROFILES_KEY: &str = "frenchQuizProfiles";
pub const ACTIVE_PROFILE_KEY: &str = "frenchQuizCurrentProfileId";
pub const NAVIGATION_KEY: &str = "frenchQuizNavigationState";
pub const BACKUP_KEY_PREFIX: &str = "frenchQuizProfiles_backup_";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    #[error("profile limit reached ({MAX_PROFILES_PER_DEVICE} per device)")]
    ProfileLimit,

    #[error("invalid profile name: {0}")]
    InvalidName(String),

    #[error("backup not found: {0}")]
    BackupNotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub struct ProfileStore {
    backend: Arc<dyn StorageBackend>,
}

impl ProfileStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// File-backed store rooted at `dir`, one JSON document per slot.
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::new(Arc::new(FileBackend::open(dir)?)))
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    // ---- whole-map access ----

    pub fn load_profiles(&self) -> StoreResult<HashMap<String, Profile>> {
        match self.backend.load(PROFILES_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(HashMap::new()),
        }
    }

    pub fn save_profiles(&self, profiles: &HashMap<String, Profile>) -> StoreResult<()> {
        let raw = serde_json::to_string(profiles)?;
        self.backend.store(PROFILES_KEY, &raw)
    }

    /// Raw slot contents, used by migration backups so a restore is verbatim.
    pub fn load_raw_profiles(&self) -> StoreResult<Option<String>> {
        self.backend.load(PROFILES_KEY)
    }

    pub fn save_raw_profiles(&self, raw: &str) -> StoreResult<()> {
        self.backend.store(PROFILES_KEY, raw)
    }

    pub fn load_slot(&self, key: &str) -> StoreResult<Option<String>> {
        self.backend.load(key)
    }

    pub fn save_slot(&self, key: &str, value: &str) -> StoreResult<()> {
        self.backend.store(key, value)
    }

    pub fn slot_keys(&self) -> StoreResult<Vec<String>> {
        self.backend.keys()
    }

    // ---- profile CRUD ----

    pub fn get(&self, id: &str) -> StoreResult<Option<Profile>> {
        Ok(self.load_profiles()?.remove(id))
    }

    pub fn upsert(&self, profile: Profile) -> StoreResult<()> {
        let mut profiles = self.load_profiles()?;
        profiles.insert(profile.id.clone(), profile);
        self.save_profiles(&profiles)
    }

    /// Profiles in insertion order. Ids embed their creation timestamp, so
    /// ordering by `createdAt` (id as tiebreak) reproduces it.
    pub fn list(&self) -> StoreResult<Vec<Profile>> {
        let mut profiles: Vec<Profile> = self.load_profiles()?.into_values().collect();
        profiles.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(profiles)
    }

    /// Irreversible. If the deleted profile was active, the pointer moves to
    /// the first remaining profile, or clears.
    pub fn delete(&self, id: &str) -> StoreResult<()> {
        let mut profiles = self.load_profiles()?;
        if profiles.remove(id).is_none() {
            return Err(StoreError::ProfileNotFound(id.to_string()));
        }
        self.save_profiles(&profiles)?;

        if self.active_profile_id()?.as_deref() == Some(id) {
            let next = self.list()?.into_iter().next().map(|p| p.id);
            self.set_active_profile(next.as_deref())?;
        }
        Ok(())
    }

    pub fn create_profile(&self, name: &str, avatar: Option<&str>) -> StoreResult<Profile> {
        validate_name(name)?;
        let mut profiles = self.load_profiles()?;
        if profiles.len() >= MAX_PROFILES_PER_DEVICE {
            return Err(StoreError::ProfileLimit);
        }

        let unique = unique_name(&profiles, name, None);
        let mut ts = chrono::Utc::now().timestamp_millis();
        while profiles.contains_key(&format!("profile-{ts}")) {
            ts += 1;
        }
        let id = format!("profile-{ts}");
        let profile = Profile::new(id.clone(), unique, avatar.map(str::to_string), ts);

        profiles.insert(id.clone(), profile.clone());
        self.save_profiles(&profiles)?;
        self.set_active_profile(Some(&id))?;
        Ok(profile)
    }

    /// Returns the applied name, which may carry a numeric suffix.
    pub fn rename_profile(&self, id: &str, new_name: &str) -> StoreResult<String> {
        validate_name(new_name)?;
        let mut profiles = self.load_profiles()?;
        if !profiles.contains_key(id) {
            return Err(StoreError::ProfileNotFound(id.to_string()));
        }
        let unique = unique_name(&profiles, new_name, Some(id));
        let profile = profiles.get_mut(id).expect("checked above");
        profile.name = unique.clone();
        profile.last_modified = Some(chrono::Utc::now().timestamp_millis());
        self.save_profiles(&profiles)?;
        Ok(unique)
    }

    pub fn set_profile_avatar(&self, id: &str, avatar: &str) -> StoreResult<()> {
        let mut profiles = self.load_profiles()?;
        let profile = profiles
            .get_mut(id)
            .ok_or_else(|| StoreError::ProfileNotFound(id.to_string()))?;
        profile.avatar = Some(avatar.to_string());
        profile.last_modified = Some(chrono::Utc::now().timestamp_millis());
        self.save_profiles(&profiles)
    }

    // ---- active-profile pointer ----

    pub fn active_profile_id(&self) -> StoreResult<Option<String>> {
        match self.backend.load(ACTIVE_PROFILE_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(None),
        }
    }

    pub fn set_active_profile(&self, id: Option<&str>) -> StoreResult<()> {
        let raw = serde_json::to_string(&id)?;
        self.backend.store(ACTIVE_PROFILE_KEY, &raw)
    }

    // ---- navigation state ----

    pub fn navigation_state(&self) -> StoreResult<Option<serde_json::Value>> {
        match self.backend.load(NAVIGATION_KEY)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn set_navigation_state(&self, state: &serde_json::Value) -> StoreResult<()> {
        self.backend.store(NAVIGATION_KEY, &serde_json::to_string(state)?)
    }
}

fn validate_name(name: &str) -> StoreResult<()> {
    let len = name.trim().chars().count();
    if !(PROFILE_NAME_MIN_LEN..=PROFILE_NAME_MAX_LEN).contains(&len) {
        return Err(StoreError::InvalidName(format!(
            "name must be {PROFILE_NAME_MIN_LEN}-{PROFILE_NAME_MAX_LEN} characters"
        )));
    }
    Ok(())
}

/// Case-insensitive uniqueness with " 2", " 3", ... suffixes.
fn unique_name(
    profiles: &HashMap<String, Profile>,
    desired: &str,
    exclude_id: Option<&str>,
) -> String {
    let taken: Vec<String> = profiles
        .values()
        .filter(|p| exclude_id != Some(p.id.as_str()))
        .map(|p| p.name.to_lowercase())
        .collect();

    let desired = desired.trim();
    let mut candidate = desired.to_string();
    let mut counter = 2u32;
    while taken.contains(&candidate.to_lowercase()) {
        candidate = format!("{desired} {counter}");
        counter += 1;
    }
    candidate
}
