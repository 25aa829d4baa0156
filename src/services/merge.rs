//! Merge-on-import.
//!
//! When a redeemed transfer carries a profile id that already exists locally,
//! the two copies are merged instead of overwritten. Word counters take the
//! max of each field independently; that is a documented approximation and can
//! leave `attempts < correct + incorrect` when the two sides diverged
//! asymmetrically.

use std::collections::HashMap;

use crate::models::{Metadata, Profile, WordStat, RECENT_HISTORY_CAP};
use crate::store::{ProfileStore, StoreError, StoreResult};
use crate::models::MAX_PROFILES_PER_DEVICE;

pub fn merge_word_stat(local: &WordStat, imported: &WordStat) -> WordStat {
    let mut combined = Vec::new();
    for history in [&local.recent_history, &imported.recent_history] {
        if let Some(records) = history {
            combined.extend(records.iter().cloned());
        }
    }
    combined.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    combined.dedup();
    combined.truncate(RECENT_HISTORY_CAP);

    WordStat {
        attempts: local.attempts.max(imported.attempts),
        correct: local.correct.max(imported.correct),
        incorrect: local.incorrect.max(imported.incorrect),
        category: if imported.category.is_empty() {
            local.category.clone()
        } else {
            imported.category.clone()
        },
        first_attempt: min_opt(local.first_attempt, imported.first_attempt),
        last_practiced: max_opt(local.last_practiced, imported.last_practiced),
        recent_history: Some(combined),
    }
}

pub fn merge_metadata(local: &Metadata, imported: &Metadata) -> Metadata {
    let mut daily_stats = local.daily_stats.clone();
    for (day, imported_day) in &imported.daily_stats {
        let entry = daily_stats.entry(day.clone()).or_default();
        entry.attempts = entry.attempts.max(imported_day.attempts);
        entry.correct = entry.correct.max(imported_day.correct);
        entry.incorrect = entry.incorrect.max(imported_day.incorrect);
        entry.time_spent = entry.time_spent.max(imported_day.time_spent);
        entry.sessions_completed = entry.sessions_completed.max(imported_day.sessions_completed);
        entry
            .words_attempted
            .extend(imported_day.words_attempted.iter().cloned());
        entry.start_time = if entry.start_time == 0 {
            imported_day.start_time
        } else if imported_day.start_time == 0 {
            entry.start_time
        } else {
            entry.start_time.min(imported_day.start_time)
        };
    }

    Metadata {
        current_streak: local.current_streak.max(imported.current_streak),
        longest_streak: local.longest_streak.max(imported.longest_streak),
        last_practice_date: max_opt(
            local.last_practice_date.clone(),
            imported.last_practice_date.clone(),
        ),
        total_sessions: local.total_sessions.max(imported.total_sessions),
        total_practice_time: local.total_practice_time.max(imported.total_practice_time),
        daily_stats,
        created_at: min_opt(local.created_at, imported.created_at),
        last_modified: max_opt(local.last_modified, imported.last_modified),
    }
}

/// Merged view of a local profile and an imported snapshot with the same id.
pub fn merge_profiles(local: &Profile, imported: &Profile) -> Profile {
    let mut stats: HashMap<String, WordStat> = local.stats.clone();
    for (word_id, imported_stat) in &imported.stats {
        let merged = match local.stats.get(word_id) {
            Some(local_stat) => merge_word_stat(local_stat, imported_stat),
            None => imported_stat.clone(),
        };
        stats.insert(word_id.clone(), merged);
    }

    let metadata = match (&local.metadata, &imported.metadata) {
        (Some(a), Some(b)) => Some(merge_metadata(a, b)),
        (Some(a), None) => Some(a.clone()),
        (None, Some(b)) => Some(b.clone()),
        (None, None) => None,
    };

    let mut sessions = local.sessions.clone().unwrap_or_default();
    if let Some(imported_sessions) = &imported.sessions {
        for (id, session) in imported_sessions {
            sessions.entry(id.clone()).or_insert_with(|| session.clone());
        }
    }

    Profile {
        id: imported.id.clone(),
        name: imported.name.clone(),
        avatar: imported.avatar.clone().or_else(|| local.avatar.clone()),
        stats,
        metadata,
        sessions: Some(sessions),
        created_at: min_opt(local.created_at, imported.created_at),
        last_modified: max_opt(local.last_modified, imported.last_modified),
        version: local.version.max(imported.version),
    }
}

/// Adopt-or-merge a redeemed profile into the store. A genuinely new profile
/// is refused when the device already holds the maximum number of profiles.
pub fn import_profile(store: &ProfileStore, imported: Profile) -> StoreResult<String> {
    let mut profiles = store.load_profiles()?;
    let id = imported.id.clone();

    match profiles.get(&id) {
        Some(local) => {
            let merged = merge_profiles(local, &imported);
            profiles.insert(id.clone(), merged);
        }
        None => {
            if profiles.len() >= MAX_PROFILES_PER_DEVICE {
                return Err(StoreError::ProfileLimit);
            }
            let mut adopted = imported;
            if adopted.last_modified.is_none() {
                adopted.last_modified = Some(chrono::Utc::now().timestamp_millis());
            }
            profiles.insert(id.clone(), adopted);
        }
    }

    store.save_profiles(&profiles)?;
    Ok(id)
}

fn min_opt<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn max_opt<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttemptRecord, PracticeMode};

    fn stat(attempts: u32, correct: u32, incorrect: u32) -> WordStat {
        WordStat {
            attempts,
            correct,
            incorrect,
            ..WordStat::new("grade1")
        }
    }

    #[test]
    fn word_counters_take_independent_per_field_max() {
        let local = stat(5, 3, 2);
        let imported = stat(7, 3, 3);
        let merged = merge_word_stat(&local, &imported);
        assert_eq!((merged.attempts, merged.correct, merged.incorrect), (7, 3, 3));

        // The documented approximation: independent maxima may break the
        // attempts == correct + incorrect identity.
        let skewed = merge_word_stat(&stat(5, 5, 0), &stat(5, 0, 5));
        assert_eq!((skewed.attempts, skewed.correct, skewed.incorrect), (5, 5, 5));
    }

    #[test]
    fn history_union_is_truncated_to_most_recent() {
        let record = |ts: i64| AttemptRecord {
            timestamp: ts,
            correct: true,
            mode: PracticeMode::MultipleChoice,
            session_id: None,
        };
        let mut local = stat(8, 8, 0);
        local.recent_history = Some((0..8).map(|i| record(100 - i)).collect());
        let mut imported = stat(8, 8, 0);
        imported.recent_history = Some((0..8).map(|i| record(200 - i)).collect());

        let merged = merge_word_stat(&local, &imported);
        let history = merged.recent_history.unwrap();
        assert_eq!(history.len(), RECENT_HISTORY_CAP);
        assert_eq!(history[0].timestamp, 200);
        assert!(history.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
        // All ten survivors come from the newer side.
        assert!(history.iter().all(|r| r.timestamp > 100));
    }

    #[test]
    fn identical_shared_history_is_not_doubled() {
        let record = |ts: i64| AttemptRecord {
            timestamp: ts,
            correct: false,
            mode: PracticeMode::Flashcard,
            session_id: Some("session-1".into()),
        };
        let mut local = stat(3, 0, 3);
        local.recent_history = Some(vec![record(3), record(2), record(1)]);
        let imported = local.clone();

        let merged = merge_word_stat(&local, &imported);
        assert_eq!(merged.recent_history.unwrap().len(), 3);
    }

    #[test]
    fn timestamps_keep_earlier_first_and_later_last() {
        let mut local = stat(1, 1, 0);
        local.first_attempt = Some(100);
        local.last_practiced = Some(500);
        let mut imported = stat(1, 1, 0);
        imported.first_attempt = Some(50);
        imported.last_practiced = Some(900);

        let merged = merge_word_stat(&local, &imported);
        assert_eq!(merged.first_attempt, Some(50));
        assert_eq!(merged.last_practiced, Some(900));
    }

    #[test]
    fn metadata_counters_max_and_later_practice_date() {
        let local = Metadata {
            current_streak: 3,
            longest_streak: 9,
            last_practice_date: Some("2024-03-01".into()),
            total_sessions: 10,
            total_practice_time: 1_000,
            ..Metadata::default()
        };
        let imported = Metadata {
            current_streak: 5,
            longest_streak: 6,
            last_practice_date: Some("2024-03-04".into()),
            total_sessions: 8,
            total_practice_time: 2_000,
            ..Metadata::default()
        };

        let merged = merge_metadata(&local, &imported);
        assert_eq!(merged.current_streak, 5);
        assert_eq!(merged.longest_streak, 9);
        assert!(merged.longest_streak >= merged.current_streak);
        assert_eq!(merged.last_practice_date.as_deref(), Some("2024-03-04"));
        assert_eq!(merged.total_sessions, 10);
        assert_eq!(merged.total_practice_time, 2_000);
    }

    #[test]
    fn import_merges_existing_profile_in_place() {
        let store = ProfileStore::in_memory();
        let local = store.create_profile("Emma", None).unwrap();

        let mut snapshot = local.clone();
        snapshot.stats.insert("w1".into(), stat(7, 3, 3));
        let id = import_profile(&store, snapshot).unwrap();
        assert_eq!(id, local.id);

        let merged = store.get(&local.id).unwrap().unwrap();
        assert_eq!(merged.stats["w1"].attempts, 7);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn import_refuses_new_profile_at_device_cap() {
        let store = ProfileStore::in_memory();
        for name in ["Ana", "Ben", "Cleo"] {
            store.create_profile(name, None).unwrap();
        }
        let foreign = Profile::new("profile-424242".into(), "Dora".into(), None, 424_242);
        assert!(matches!(
            import_profile(&store, foreign),
            Err(StoreError::ProfileLimit)
        ));
    }

    #[test]
    fn import_adopts_new_profile_below_cap() {
        let store = ProfileStore::in_memory();
        let foreign = Profile::new("profile-424242".into(), "Dora".into(), None, 424_242);
        let id = import_profile(&store, foreign).unwrap();
        assert_eq!(store.get(&id).unwrap().unwrap().name, "Dora");
    }
}
