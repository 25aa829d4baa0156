//! Profile schema migration.
//!
//! Versioned migration runs as a dispatch table of pure per-profile steps
//! (`v1 -> v2`, ...). Legacy records carry no version tag, so structural
//! markers (missing `metadata.createdAt`, missing `sessions`, any stat without
//! `recentHistory`) identify version 1. `safe_migration` wraps the impure
//! whole-store pass with a verbatim backup and automatic rollback; backups are
//! never pruned here.
//!
//! The v1 step backfills each legacy word stat with up to 5 synthetic attempt
//! records spaced between the profile's creation and last modification, each
//! marked correct with probability `correct/attempts`. The reconstruction is
//! statistically approximate on purpose; callers supply the RNG so tests can
//! seed it, and tests assert shape only, never values.

use chrono::{Local, TimeZone};
use rand::Rng;
use thiserror::Error;

use crate::models::{
    AttemptRecord, Metadata, PracticeMode, Profile, CURRENT_PROFILE_VERSION,
};
use crate::services::recorder::format_day;
use crate::store::{ProfileStore, StoreError, StoreResult, BACKUP_KEY_PREFIX};

/// Step table, one entry per `from -> from + 1` upgrade. Kept alongside
/// `run_step` so adding a version touches both in one place.
const MIGRATION_STEPS: &[(u32, &str)] = &[(1, "timestamps, metadata and attempt history")];

const MAX_SYNTHETIC_ATTEMPTS: u32 = 5;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("backup failed: {0}")]
    Backup(#[source] StoreError),

    #[error("migration failed (restored from backup: {restored}): {source}")]
    Failed {
        #[source]
        source: StoreError,
        restored: bool,
    },

    #[error("migrated data failed validation (restored from backup: {restored})")]
    Validation { restored: bool },
}

#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub migrated: usize,
    pub backup_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BackupInfo {
    pub key: String,
    pub timestamp: i64,
}

pub fn needs_migration(profile: &Profile) -> bool {
    if profile.version >= CURRENT_PROFILE_VERSION {
        return false;
    }
    let Some(metadata) = &profile.metadata else {
        return true;
    };
    if metadata.created_at.is_none() || profile.sessions.is_none() {
        return true;
    }
    profile.stats.values().any(|stat| stat.recent_history.is_none())
}

/// Pure migration of one profile. Already-migrated input only gets its
/// version normalized.
pub fn migrate_profile<R: Rng>(old: &Profile, rng: &mut R) -> Profile {
    let mut profile = old.clone();
    if needs_migration(old) {
        let mut version = profile.version.max(1);
        while version < CURRENT_PROFILE_VERSION {
            version = run_step(version, &mut profile, rng);
        }
    }
    profile.version = CURRENT_PROFILE_VERSION;
    profile
}

fn run_step<R: Rng>(from: u32, profile: &mut Profile, rng: &mut R) -> u32 {
    match from {
        1 => {
            migrate_v1_to_v2(profile, rng);
            2
        }
        // Unknown intermediate versions have no registered step; skip forward.
        other => other + 1,
    }
}

fn migrate_v1_to_v2<R: Rng>(profile: &mut Profile, rng: &mut R) {
    let now_ms = chrono::Utc::now().timestamp_millis();
    let created_ms = profile.created_at.unwrap_or(now_ms);
    let modified_ms = profile.last_modified.unwrap_or(now_ms);

    let metadata = profile.metadata.get_or_insert_with(Metadata::default);
    if metadata.created_at.is_none() {
        metadata.created_at = Some(created_ms);
    }
    if metadata.last_modified.is_none() {
        metadata.last_modified = Some(modified_ms);
    }
    // Approximation, not history: the best signal a v1 record has for "when
    // did they last practice" is the profile's own modification time.
    if metadata.last_practice_date.is_none() {
        if let Some(day) = Local
            .timestamp_millis_opt(modified_ms)
            .single()
            .map(|dt| dt.date_naive())
        {
            metadata.last_practice_date = Some(format_day(day));
            metadata.current_streak = 1;
            metadata.longest_streak = metadata.longest_streak.max(1);
        }
    }

    for stat in profile.stats.values_mut() {
        if stat.recent_history.is_some() && stat.first_attempt.is_some() {
            continue;
        }
        stat.first_attempt = Some(created_ms);
        stat.last_practiced = Some(modified_ms);

        let mut history = Vec::new();
        if stat.attempts > 0 {
            let interval = if stat.attempts > 1 {
                (modified_ms - created_ms) / i64::from(stat.attempts)
            } else {
                0
            };
            let count = stat.attempts.min(MAX_SYNTHETIC_ATTEMPTS);
            let correct_ratio =
                (f64::from(stat.correct) / f64::from(stat.attempts)).clamp(0.0, 1.0);
            for i in 0..count {
                history.push(AttemptRecord {
                    timestamp: modified_ms - interval * i64::from(i),
                    correct: rng.random_bool(correct_ratio),
                    mode: PracticeMode::MultipleChoice,
                    session_id: None,
                });
            }
        }
        stat.recent_history = Some(history);
    }

    if profile.sessions.is_none() {
        profile.sessions = Some(Default::default());
    }
    if profile.created_at.is_none() {
        profile.created_at = Some(created_ms);
    }
    if profile.last_modified.is_none() {
        profile.last_modified = Some(modified_ms);
    }
}

/// Impure pass over the whole store. Every profile comes out stamped with the
/// current version; returns how many actually needed migrating.
pub fn migrate_all_profiles<R: Rng>(store: &ProfileStore, rng: &mut R) -> StoreResult<usize> {
    let profiles = store.load_profiles()?;
    let mut migrated = 0usize;
    let mut out = std::collections::HashMap::with_capacity(profiles.len());

    for (id, profile) in profiles {
        if needs_migration(&profile) {
            tracing::info!(profile = %profile.name, id = %id, "migrating profile");
            out.insert(id, migrate_profile(&profile, rng));
            migrated += 1;
        } else {
            let mut stamped = profile;
            stamped.version = CURRENT_PROFILE_VERSION;
            out.insert(id, stamped);
        }
    }

    store.save_profiles(&out)?;
    Ok(migrated)
}

/// Backup the raw profiles slot under a timestamped key. `Ok(None)` when
/// there is nothing to back up.
pub fn backup_profiles(store: &ProfileStore) -> StoreResult<Option<String>> {
    let Some(raw) = store.load_raw_profiles()? else {
        return Ok(None);
    };
    let timestamp = chrono::Utc::now().timestamp_millis();
    let key = format!("{BACKUP_KEY_PREFIX}{timestamp}");
    store.save_slot(&key, &raw)?;
    Ok(Some(key))
}

pub fn restore_from_backup(store: &ProfileStore, backup_key: &str) -> StoreResult<()> {
    let raw = store
        .load_slot(backup_key)?
        .ok_or_else(|| StoreError::BackupNotFound(backup_key.to_string()))?;
    store.save_raw_profiles(&raw)
}

/// Available backups, newest first.
pub fn list_backups(store: &ProfileStore) -> StoreResult<Vec<BackupInfo>> {
    let mut backups: Vec<BackupInfo> = store
        .slot_keys()?
        .into_iter()
        .filter_map(|key| {
            let timestamp = key.strip_prefix(BACKUP_KEY_PREFIX)?.parse::<i64>().ok()?;
            Some(BackupInfo { key, timestamp })
        })
        .collect();
    backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(backups)
}

/// Backup-then-migrate with automatic rollback. Runs once per app start,
/// before anything else touches the store. On failure the caller continues
/// with the restored, un-migrated data.
pub fn safe_migration(store: &ProfileStore) -> Result<MigrationReport, MigrationError> {
    let backup_key = match backup_profiles(store) {
        Ok(None) => {
            return Ok(MigrationReport {
                migrated: 0,
                backup_key: None,
            })
        }
        Ok(Some(key)) => key,
        Err(err) => return Err(MigrationError::Backup(err)),
    };

    let mut rng = rand::rng();
    match migrate_all_profiles(store, &mut rng) {
        Ok(migrated) => {
            // Post-write validation: nothing may still report as legacy.
            match store.load_profiles() {
                Ok(profiles) if profiles.values().all(|p| !needs_migration(p)) => {
                    tracing::info!(migrated, backup_key = %backup_key, "profile migration complete");
                    Ok(MigrationReport {
                        migrated,
                        backup_key: Some(backup_key),
                    })
                }
                _ => {
                    let restored = restore_from_backup(store, &backup_key).is_ok();
                    tracing::error!(restored, "migrated profiles failed validation, rolling back");
                    Err(MigrationError::Validation { restored })
                }
            }
        }
        Err(err) => {
            let restored = restore_from_backup(store, &backup_key).is_ok();
            tracing::error!(error = %err, restored, "profile migration failed, rolling back");
            Err(MigrationError::Failed {
                source: err,
                restored,
            })
        }
    }
}

/// Step names, exposed for diagnostics.
pub fn migration_steps() -> &'static [(u32, &'static str)] {
    MIGRATION_STEPS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WordStat;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn legacy_profile() -> Profile {
        let raw = r#"{
            "id": "profile-1700000000000",
            "name": "Emma",
            "stats": {
                "12": { "attempts": 7, "correct": 3, "incorrect": 4, "category": "grade1" },
                "13": { "attempts": 0, "correct": 0, "incorrect": 0, "category": "grade1" }
            },
            "createdAt": 1700000000000,
            "lastModified": 1700500000000
        }"#;
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn detects_all_legacy_markers() {
        let legacy = legacy_profile();
        assert!(needs_migration(&legacy));

        let mut rng = StdRng::seed_from_u64(7);
        let migrated = migrate_profile(&legacy, &mut rng);
        assert!(!needs_migration(&migrated));

        // Version alone short-circuits the structural checks.
        let mut tagged = legacy.clone();
        tagged.version = CURRENT_PROFILE_VERSION;
        assert!(!needs_migration(&tagged));

        // A single stat without history drags the profile back in.
        let mut partial = migrated.clone();
        partial.version = 1;
        partial
            .stats
            .insert("99".into(), {
                let mut stat = WordStat::new("grade2");
                stat.recent_history = None;
                stat
            });
        assert!(needs_migration(&partial));
    }

    #[test]
    fn fills_metadata_and_seeds_streak_from_last_modified() {
        let mut rng = StdRng::seed_from_u64(7);
        let migrated = migrate_profile(&legacy_profile(), &mut rng);

        let metadata = migrated.metadata.as_ref().unwrap();
        assert_eq!(metadata.created_at, Some(1_700_000_000_000));
        assert_eq!(metadata.last_modified, Some(1_700_500_000_000));
        assert_eq!(metadata.current_streak, 1);
        assert!(metadata.longest_streak >= metadata.current_streak);
        let expected_day = Local
            .timestamp_millis_opt(1_700_500_000_000)
            .single()
            .map(|dt| format_day(dt.date_naive()))
            .unwrap();
        assert_eq!(metadata.last_practice_date.as_deref(), Some(expected_day.as_str()));
        assert!(migrated.sessions.as_ref().unwrap().is_empty());
        assert_eq!(migrated.version, CURRENT_PROFILE_VERSION);
    }

    #[test]
    fn synthesizes_bounded_history_without_touching_counters() {
        let mut rng = StdRng::seed_from_u64(7);
        let migrated = migrate_profile(&legacy_profile(), &mut rng);

        let stat = &migrated.stats["12"];
        assert_eq!((stat.attempts, stat.correct, stat.incorrect), (7, 3, 4));
        assert_eq!(stat.first_attempt, Some(1_700_000_000_000));
        assert_eq!(stat.last_practiced, Some(1_700_500_000_000));

        // Shape only: the correctness of each synthetic record is random.
        let history = stat.recent_history.as_ref().unwrap();
        assert_eq!(history.len(), 5);
        assert!(history.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
        assert!(history
            .iter()
            .all(|r| (1_700_000_000_000..=1_700_500_000_000).contains(&r.timestamp)));
        assert!(history.iter().all(|r| r.session_id.is_none()));

        // Zero attempts: empty history, no invented records.
        let untouched = &migrated.stats["13"];
        assert_eq!(untouched.recent_history.as_ref().unwrap().len(), 0);
    }

    #[test]
    fn migration_is_idempotent_beyond_version_stamping() {
        let mut rng = StdRng::seed_from_u64(7);
        let once = migrate_profile(&legacy_profile(), &mut rng);
        let mut rng2 = StdRng::seed_from_u64(99);
        let twice = migrate_profile(&once, &mut rng2);
        assert_eq!(twice, once);
    }

    #[test]
    fn safe_migration_migrates_and_keeps_a_backup() {
        let store = ProfileStore::in_memory();
        let legacy = legacy_profile();
        let mut map = std::collections::HashMap::new();
        map.insert(legacy.id.clone(), legacy);
        store.save_profiles(&map).unwrap();
        let raw_before = store.load_raw_profiles().unwrap().unwrap();

        let report = safe_migration(&store).unwrap();
        assert_eq!(report.migrated, 1);
        let backup_key = report.backup_key.unwrap();
        assert_eq!(store.load_slot(&backup_key).unwrap().unwrap(), raw_before);

        let backups = list_backups(&store).unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].key, backup_key);

        // Restoring brings the legacy bytes back verbatim.
        restore_from_backup(&store, &backup_key).unwrap();
        assert_eq!(store.load_raw_profiles().unwrap().unwrap(), raw_before);
    }

    #[test]
    fn safe_migration_rolls_back_on_failure() {
        let store = ProfileStore::in_memory();
        // Valid JSON slot, but not a parseable profile map.
        let broken = r#"{"profile-1": 42}"#;
        store.save_raw_profiles(broken).unwrap();

        let err = safe_migration(&store).unwrap_err();
        assert!(matches!(err, MigrationError::Failed { restored: true, .. }));
        assert_eq!(store.load_raw_profiles().unwrap().unwrap(), broken);
    }

    #[test]
    fn safe_migration_with_empty_store_is_a_no_op() {
        let store = ProfileStore::in_memory();
        let report = safe_migration(&store).unwrap();
        assert_eq!(report.migrated, 0);
        assert!(report.backup_key.is_none());
        assert!(list_backups(&store).unwrap().is_empty());
    }
}
