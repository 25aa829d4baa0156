//! Profile data model.
//!
//! Serialized as camelCase JSON so transfer payloads stay byte-compatible with
//! the web client's local-storage format. Fields whose absence marks a
//! pre-migration record (`metadata.createdAt`, `sessions`, `recentHistory`,
//! the per-stat timestamps and `version`) are optional; the migration engine
//! in `services::migration` normalizes them.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Schema version stamped on fully-migrated profiles.
pub const CURRENT_PROFILE_VERSION: u32 = 2;

/// At most this many profiles coexist on one device.
pub const MAX_PROFILES_PER_DEVICE: usize = 3;

/// Per-word attempt history is capped at the most recent entries.
pub const RECENT_HISTORY_CAP: usize = 10;

/// Daily aggregates older than this many calendar days are pruned on write.
pub const DAILY_STATS_RETENTION_DAYS: u64 = 90;

pub const PROFILE_NAME_MIN_LEN: usize = 3;
pub const PROFILE_NAME_MAX_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PracticeMode {
    MultipleChoice,
    Flashcard,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub timestamp: i64,
    pub correct: bool,
    pub mode: PracticeMode,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordStat {
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub correct: u32,
    #[serde(default)]
    pub incorrect: u32,
    #[serde(default = "default_category")]
    pub category: String,
    /// Epoch millis of the first recorded attempt. Absent on legacy records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_attempt: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_practiced: Option<i64>,
    /// Most-recent-first, capped at [`RECENT_HISTORY_CAP`]. Absent on legacy records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_history: Option<Vec<AttemptRecord>>,
}

fn default_category() -> String {
    "unknown".to_string()
}

impl WordStat {
    pub fn new(category: &str) -> Self {
        Self {
            attempts: 0,
            correct: 0,
            incorrect: 0,
            category: category.to_string(),
            first_attempt: None,
            last_practiced: None,
            recent_history: Some(Vec::new()),
        }
    }

    pub fn accuracy(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            f64::from(self.correct) / f64::from(self.attempts) * 100.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStat {
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub correct: u32,
    #[serde(default)]
    pub incorrect: u32,
    /// Accumulated practice time in millis; always added to, never set.
    #[serde(default)]
    pub time_spent: i64,
    /// Set semantics: repeats of the same word do not grow this.
    #[serde(default)]
    pub words_attempted: HashSet<String>,
    #[serde(default)]
    pub sessions_completed: u32,
    #[serde(default)]
    pub start_time: i64,
}

impl DailyStat {
    pub fn opened_at(start_time: i64) -> Self {
        Self {
            start_time,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default)]
    pub current_streak: u32,
    #[serde(default)]
    pub longest_streak: u32,
    /// Local calendar day ("YYYY-MM-DD") of the most recent attempt.
    #[serde(default)]
    pub last_practice_date: Option<String>,
    #[serde(default)]
    pub total_sessions: u32,
    #[serde(default)]
    pub total_practice_time: i64,
    /// Keyed by "YYYY-MM-DD"; only the most recent 90 days are retained.
    #[serde(default)]
    pub daily_stats: BTreeMap<String, DailyStat>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub last_modified: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub start_time: i64,
    #[serde(default)]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub items_attempted: u32,
    #[serde(default)]
    pub items_correct: u32,
    /// Percentage, finalized together with `end_time`.
    #[serde(default)]
    pub accuracy: f64,
    pub mode: PracticeMode,
    pub category: String,
}

impl Session {
    pub fn is_finalized(&self) -> bool {
        self.end_time.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub stats: HashMap<String, WordStat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessions: Option<HashMap<String, Session>>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub last_modified: Option<i64>,
    #[serde(default)]
    pub version: u32,
}

impl Profile {
    /// A fresh profile already carries the current schema.
    pub fn new(id: String, name: String, avatar: Option<String>, now_ms: i64) -> Self {
        Self {
            id,
            name,
            avatar,
            stats: HashMap::new(),
            metadata: Some(Metadata {
                created_at: Some(now_ms),
                last_modified: Some(now_ms),
                ..Metadata::default()
            }),
            sessions: Some(HashMap::new()),
            created_at: Some(now_ms),
            last_modified: Some(now_ms),
            version: CURRENT_PROFILE_VERSION,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        self.metadata.get_or_insert_with(Metadata::default)
    }

    pub fn sessions_mut(&mut self) -> &mut HashMap<String, Session> {
        self.sessions.get_or_insert_with(HashMap::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn practice_mode_uses_camel_case_wire_names() {
        assert_eq!(
            serde_json::to_string(&PracticeMode::MultipleChoice).unwrap(),
            "\"multipleChoice\""
        );
        assert_eq!(
            serde_json::to_string(&PracticeMode::Flashcard).unwrap(),
            "\"flashcard\""
        );
    }

    #[test]
    fn legacy_profile_without_new_fields_still_parses() {
        let raw = r#"{
            "id": "profile-1700000000000",
            "name": "Emma",
            "stats": {
                "12": { "attempts": 5, "correct": 3, "incorrect": 2, "category": "grade1" }
            },
            "createdAt": 1700000000000,
            "lastModified": 1700500000000
        }"#;

        let profile: Profile = serde_json::from_str(raw).unwrap();
        assert_eq!(profile.version, 0);
        assert!(profile.metadata.is_none());
        assert!(profile.sessions.is_none());
        let stat = &profile.stats["12"];
        assert_eq!(stat.attempts, 5);
        assert!(stat.recent_history.is_none());
        assert!(stat.first_attempt.is_none());
    }

    #[test]
    fn profile_round_trips_through_camel_case_json() {
        let profile = Profile::new("profile-1".into(), "Léa".into(), Some("fox".into()), 1_700_000_000_000);
        let json = serde_json::to_value(&profile).unwrap();
        assert!(json.get("createdAt").is_some());
        assert!(json.get("lastModified").is_some());
        let back: Profile = serde_json::from_value(json).unwrap();
        assert_eq!(back, profile);
    }
}
