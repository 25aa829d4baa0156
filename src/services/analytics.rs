//! Read-only aggregation over one profile: overall accuracy, streak status,
//! practice recommendations and achievement thresholds.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{AttemptRecord, Profile};
use crate::services::recorder::format_day;

const NEEDS_PRACTICE_ACCURACY: f64 = 60.0;
const NEEDS_PRACTICE_MIN_ATTEMPTS: u32 = 2;
const MASTERED_ACCURACY: f64 = 90.0;
const MASTERED_MIN_ATTEMPTS: u32 = 3;
const RECENT_ACTIVITY_LIMIT: usize = 20;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
    pub total_items: usize,
    pub total_attempts: u32,
    pub total_correct: u32,
    pub total_incorrect: u32,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakInfo {
    pub current: u32,
    pub longest: u32,
    pub last_practice: Option<String>,
    pub is_active_today: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WordAccuracy {
    pub word_id: String,
    pub attempts: u32,
    pub correct: u32,
    pub incorrect: u32,
    pub category: String,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryProgress {
    pub total_items: usize,
    pub mastered: usize,
    pub total_attempts: u32,
    pub total_correct: u32,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentAttempt {
    pub word_id: String,
    #[serde(flatten)]
    pub record: AttemptRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: &'static str,
    pub tier: &'static str,
}

pub fn overall_stats(profile: &Profile) -> OverallStats {
    let mut totals = OverallStats {
        total_items: profile.stats.len(),
        ..OverallStats::default()
    };
    for stat in profile.stats.values() {
        totals.total_attempts += stat.attempts;
        totals.total_correct += stat.correct;
        totals.total_incorrect += stat.incorrect;
    }
    if totals.total_attempts > 0 {
        totals.accuracy =
            f64::from(totals.total_correct) / f64::from(totals.total_attempts) * 100.0;
    }
    totals
}

pub fn streak_info(profile: &Profile, today: NaiveDate) -> StreakInfo {
    let metadata = profile.metadata.as_ref();
    let last_practice = metadata.and_then(|m| m.last_practice_date.clone());
    StreakInfo {
        current: metadata.map_or(0, |m| m.current_streak),
        longest: metadata.map_or(0, |m| m.longest_streak),
        is_active_today: last_practice.as_deref() == Some(format_day(today).as_str()),
        last_practice,
    }
}

/// Words under 60% accuracy with at least 2 attempts, worst first.
pub fn needs_practice(profile: &Profile) -> Vec<WordAccuracy> {
    let mut words: Vec<WordAccuracy> = profile
        .stats
        .iter()
        .filter(|(_, stat)| {
            stat.attempts >= NEEDS_PRACTICE_MIN_ATTEMPTS
                && stat.accuracy() < NEEDS_PRACTICE_ACCURACY
        })
        .map(|(id, stat)| word_accuracy(id, stat))
        .collect();
    words.sort_by(|a, b| a.accuracy.total_cmp(&b.accuracy).then_with(|| a.word_id.cmp(&b.word_id)));
    words
}

/// Words at 90%+ accuracy with at least 3 attempts.
pub fn mastered(profile: &Profile) -> Vec<WordAccuracy> {
    let mut words: Vec<WordAccuracy> = profile
        .stats
        .iter()
        .filter(|(_, stat)| {
            stat.attempts >= MASTERED_MIN_ATTEMPTS && stat.accuracy() >= MASTERED_ACCURACY
        })
        .map(|(id, stat)| word_accuracy(id, stat))
        .collect();
    words.sort_by(|a, b| a.word_id.cmp(&b.word_id));
    words
}

fn word_accuracy(id: &str, stat: &crate::models::WordStat) -> WordAccuracy {
    WordAccuracy {
        word_id: id.to_string(),
        attempts: stat.attempts,
        correct: stat.correct,
        incorrect: stat.incorrect,
        category: stat.category.clone(),
        accuracy: stat.accuracy(),
    }
}

/// The 20 most recent attempts across all words.
pub fn recent_activity(profile: &Profile) -> Vec<RecentAttempt> {
    let mut attempts: Vec<RecentAttempt> = profile
        .stats
        .iter()
        .flat_map(|(id, stat)| {
            stat.recent_history
                .iter()
                .flatten()
                .map(move |record| RecentAttempt {
                    word_id: id.clone(),
                    record: record.clone(),
                })
        })
        .collect();
    attempts.sort_by(|a, b| b.record.timestamp.cmp(&a.record.timestamp));
    attempts.truncate(RECENT_ACTIVITY_LIMIT);
    attempts
}

pub fn category_progress(profile: &Profile) -> BTreeMap<String, CategoryProgress> {
    let mut progress: BTreeMap<String, CategoryProgress> = BTreeMap::new();
    for stat in profile.stats.values() {
        let entry = progress.entry(stat.category.clone()).or_default();
        entry.total_items += 1;
        entry.total_attempts += stat.attempts;
        entry.total_correct += stat.correct;
        if stat.attempts >= MASTERED_MIN_ATTEMPTS && stat.accuracy() >= MASTERED_ACCURACY {
            entry.mastered += 1;
        }
    }
    for entry in progress.values_mut() {
        if entry.total_attempts > 0 {
            entry.accuracy =
                f64::from(entry.total_correct) / f64::from(entry.total_attempts) * 100.0;
        }
    }
    progress
}

/// Unlocked achievement thresholds. Ids and tiers only; presentation is the
/// UI's concern.
pub fn achievements(profile: &Profile, today: NaiveDate) -> Vec<Achievement> {
    let overall = overall_stats(profile);
    let streak = streak_info(profile, today);
    let mastered_count = mastered(profile).len();
    let mut unlocked = Vec::new();

    let mut push = |id, tier| unlocked.push(Achievement { id, tier });
    if overall.total_items >= 1 {
        push("first-word", "bronze");
    }
    if overall.total_items >= 25 {
        push("vocab-explorer", "silver");
    }
    if overall.total_items >= 50 {
        push("word-collector", "gold");
    }
    if overall.total_items >= 100 {
        push("vocabulary-master", "platinum");
    }
    if streak.current >= 3 {
        push("daily-learner", "bronze");
    }
    if streak.current >= 7 {
        push("week-warrior", "silver");
    }
    if streak.current >= 30 {
        push("unstoppable", "platinum");
    }
    if overall.accuracy >= 95.0 && overall.total_attempts >= 50 {
        push("ace-student", "gold");
    }
    if mastered_count >= 10 {
        push("mastery-begins", "silver");
    }
    unlocked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PracticeMode, WordStat};
    use crate::services::recorder::apply_attempt;
    use chrono::{Local, TimeZone};

    fn profile_with(stats: &[(&str, u32, u32, &str)]) -> Profile {
        let mut profile = Profile::new("profile-1".into(), "Emma".into(), None, 0);
        for (id, correct, incorrect, category) in stats {
            let mut stat = WordStat::new(category);
            stat.correct = *correct;
            stat.incorrect = *incorrect;
            stat.attempts = correct + incorrect;
            profile.stats.insert((*id).to_string(), stat);
        }
        profile
    }

    #[test]
    fn overall_stats_aggregate_across_words() {
        let profile = profile_with(&[("w1", 3, 2, "grade1"), ("w2", 4, 1, "grade2")]);
        let overall = overall_stats(&profile);
        assert_eq!(overall.total_items, 2);
        assert_eq!(overall.total_attempts, 10);
        assert_eq!(overall.total_correct, 7);
        assert_eq!(overall.accuracy, 70.0);
    }

    #[test]
    fn needs_practice_filters_and_sorts_worst_first() {
        let profile = profile_with(&[
            ("low", 1, 4, "grade1"),    // 20%
            ("mid", 2, 2, "grade1"),    // 50%
            ("high", 9, 1, "grade1"),   // 90%
            ("single", 0, 1, "grade1"), // one attempt only, excluded
        ]);
        let words: Vec<String> = needs_practice(&profile)
            .into_iter()
            .map(|w| w.word_id)
            .collect();
        assert_eq!(words, vec!["low", "mid"]);
    }

    #[test]
    fn mastered_requires_three_attempts_at_ninety_percent() {
        let profile = profile_with(&[
            ("solid", 9, 1, "grade1"),
            ("new", 2, 0, "grade1"), // perfect but too few attempts
        ]);
        let words: Vec<String> = mastered(&profile).into_iter().map(|w| w.word_id).collect();
        assert_eq!(words, vec!["solid"]);
    }

    #[test]
    fn recent_activity_is_globally_ordered_and_capped() {
        let mut profile = Profile::new("profile-1".into(), "Emma".into(), None, 0);
        let base = Local.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        for i in 0..30 {
            let word = if i % 2 == 0 { "w1" } else { "w2" };
            apply_attempt(
                &mut profile,
                word,
                true,
                PracticeMode::MultipleChoice,
                "grade1",
                None,
                base + chrono::Duration::minutes(i),
            );
        }
        let activity = recent_activity(&profile);
        assert_eq!(activity.len(), RECENT_ACTIVITY_LIMIT);
        assert!(activity
            .windows(2)
            .all(|w| w[0].record.timestamp >= w[1].record.timestamp));
    }

    #[test]
    fn category_progress_groups_and_counts_mastered() {
        let profile = profile_with(&[
            ("w1", 9, 1, "grade1"),
            ("w2", 1, 3, "grade1"),
            ("w3", 5, 0, "grade2"),
        ]);
        let progress = category_progress(&profile);
        assert_eq!(progress["grade1"].total_items, 2);
        assert_eq!(progress["grade1"].mastered, 1);
        assert_eq!(progress["grade2"].mastered, 1);
        assert_eq!(progress["grade2"].accuracy, 100.0);
    }

    #[test]
    fn achievement_thresholds_fire_exactly_at_the_boundary() {
        let mut profile = profile_with(&[("w1", 1, 0, "grade1")]);
        let today = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let ids = |p: &Profile| -> Vec<&'static str> {
            achievements(p, today).into_iter().map(|a| a.id).collect()
        };
        assert_eq!(ids(&profile), vec!["first-word"]);

        profile.metadata_mut().current_streak = 7;
        profile.metadata_mut().longest_streak = 7;
        let unlocked = ids(&profile);
        assert!(unlocked.contains(&"daily-learner"));
        assert!(unlocked.contains(&"week-warrior"));
        assert!(!unlocked.contains(&"unstoppable"));
    }

    #[test]
    fn streak_info_reports_today_activity() {
        let mut profile = profile_with(&[]);
        let today = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        profile.metadata_mut().last_practice_date = Some("2024-03-04".into());
        profile.metadata_mut().current_streak = 2;
        let info = streak_info(&profile, today);
        assert!(info.is_active_today);
        assert_eq!(info.current, 2);
        assert!(!streak_info(&profile, today.succ_opt().unwrap()).is_active_today);
    }
}
