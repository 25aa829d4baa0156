//! Attempt recorder.
//!
//! Applies a single quiz-answer event to a profile's word statistics, streak
//! and daily aggregates, plus the separate session-time accumulation and
//! session lifecycle. The pure `apply_*` functions take an explicit local
//! timestamp so calendar-day behavior is testable; the store wrappers do a
//! whole-profile read-modify-write.
//!
//! Streaks are counted against the device's local calendar day, not UTC, so a
//! learner practicing just before midnight is not split across two days.

use chrono::{DateTime, Datelike, Days, Local, NaiveDate, TimeZone};

use crate::models::{
    AttemptRecord, DailyStat, Metadata, PracticeMode, Profile, Session, WordStat,
    DAILY_STATS_RETENTION_DAYS, RECENT_HISTORY_CAP,
};
use crate::store::{ProfileStore, StoreError, StoreResult};

pub fn format_day(date: NaiveDate) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day())
}

fn parse_day(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

/// Record one answered question. One logical update: word stat, history,
/// streak and daily aggregate all move together.
pub fn apply_attempt(
    profile: &mut Profile,
    word_id: &str,
    is_correct: bool,
    mode: PracticeMode,
    category: &str,
    session_id: Option<&str>,
    now: DateTime<Local>,
) {
    let now_ms = now.timestamp_millis();
    let today = now.date_naive();

    let stat = profile
        .stats
        .entry(word_id.to_string())
        .or_insert_with(|| WordStat::new(category));

    let history = stat.recent_history.get_or_insert_with(Vec::new);
    history.insert(
        0,
        AttemptRecord {
            timestamp: now_ms,
            correct: is_correct,
            mode,
            session_id: session_id.map(str::to_string),
        },
    );
    history.truncate(RECENT_HISTORY_CAP);

    stat.attempts += 1;
    if is_correct {
        stat.correct += 1;
    } else {
        stat.incorrect += 1;
    }
    if stat.first_attempt.is_none() {
        stat.first_attempt = Some(now_ms);
    }
    stat.last_practiced = Some(now_ms);

    let metadata = profile.metadata_mut();
    update_streak(metadata, today);

    let daily = metadata
        .daily_stats
        .entry(format_day(today))
        .or_insert_with(|| DailyStat::opened_at(now_ms));
    daily.attempts += 1;
    if is_correct {
        daily.correct += 1;
    } else {
        daily.incorrect += 1;
    }
    daily.words_attempted.insert(word_id.to_string());

    prune_daily_stats(metadata, today);
    metadata.last_modified = Some(now_ms);
    profile.last_modified = Some(now_ms);
}

/// Wall-clock practice time measured by the caller between answers, added to
/// today's aggregate on teardown/navigation. Always adds, never sets, so
/// repeated flushes cannot clobber earlier ones.
pub fn apply_session_time(profile: &mut Profile, duration_ms: i64, now: DateTime<Local>) {
    let duration_ms = duration_ms.max(0);
    let now_ms = now.timestamp_millis();
    let today = now.date_naive();

    let metadata = profile.metadata_mut();
    let daily = metadata
        .daily_stats
        .entry(format_day(today))
        .or_insert_with(|| DailyStat::opened_at(now_ms));
    daily.time_spent += duration_ms;
    metadata.total_practice_time += duration_ms;

    prune_daily_stats(metadata, today);
    metadata.last_modified = Some(now_ms);
    profile.last_modified = Some(now_ms);
}

/// Opens a session at quiz start. Returns the session id.
pub fn apply_session_start(
    profile: &mut Profile,
    mode: PracticeMode,
    category: &str,
    now: DateTime<Local>,
) -> String {
    let now_ms = now.timestamp_millis();
    let sessions = profile.sessions_mut();
    let mut ts = now_ms;
    while sessions.contains_key(&format!("session-{ts}")) {
        ts += 1;
    }
    let id = format!("session-{ts}");
    sessions.insert(
        id.clone(),
        Session {
            start_time: now_ms,
            end_time: None,
            duration: None,
            items_attempted: 0,
            items_correct: 0,
            accuracy: 0.0,
            mode,
            category: category.to_string(),
        },
    );
    id
}

/// Finalizes a session at quiz end or teardown. A session is never mutated
/// after `end_time` is set; a second call is a no-op returning `false`.
pub fn apply_session_end(
    profile: &mut Profile,
    session_id: &str,
    items_attempted: u32,
    items_correct: u32,
    now: DateTime<Local>,
) -> bool {
    let now_ms = now.timestamp_millis();
    let today = now.date_naive();

    let Some(session) = profile.sessions_mut().get_mut(session_id) else {
        return false;
    };
    if session.is_finalized() {
        return false;
    }
    session.end_time = Some(now_ms);
    session.duration = Some((now_ms - session.start_time).max(0));
    session.items_attempted = items_attempted;
    session.items_correct = items_correct;
    session.accuracy = if items_attempted == 0 {
        0.0
    } else {
        f64::from(items_correct) / f64::from(items_attempted) * 100.0
    };

    let metadata = profile.metadata_mut();
    metadata.total_sessions += 1;
    metadata
        .daily_stats
        .entry(format_day(today))
        .or_insert_with(|| DailyStat::opened_at(now_ms))
        .sessions_completed += 1;
    prune_daily_stats(metadata, today);
    metadata.last_modified = Some(now_ms);
    profile.last_modified = Some(now_ms);
    true
}

fn update_streak(metadata: &mut Metadata, today: NaiveDate) {
    let yesterday = today.pred_opt();
    let last = metadata.last_practice_date.as_deref().and_then(parse_day);

    match last {
        Some(day) if day == today => {}
        Some(day) if Some(day) == yesterday => metadata.current_streak += 1,
        _ => metadata.current_streak = 1,
    }
    metadata.longest_streak = metadata.longest_streak.max(metadata.current_streak);
    metadata.last_practice_date = Some(format_day(today));
}

/// Drops aggregate entries older than the 90-day retention window, counting
/// today as day one. Unparseable keys are dropped too.
fn prune_daily_stats(metadata: &mut Metadata, today: NaiveDate) {
    let cutoff = today
        .checked_sub_days(Days::new(DAILY_STATS_RETENTION_DAYS - 1))
        .unwrap_or(today);
    metadata
        .daily_stats
        .retain(|key, _| parse_day(key).is_some_and(|day| day >= cutoff));
}

// ---- store wrappers ----

pub fn record_attempt(
    store: &ProfileStore,
    profile_id: &str,
    word_id: &str,
    is_correct: bool,
    mode: PracticeMode,
    category: &str,
    session_id: Option<&str>,
) -> StoreResult<()> {
    with_profile(store, profile_id, |profile| {
        apply_attempt(
            profile,
            word_id,
            is_correct,
            mode,
            category,
            session_id,
            Local::now(),
        );
    })
}

pub fn add_daily_session_time(
    store: &ProfileStore,
    profile_id: &str,
    duration_ms: i64,
) -> StoreResult<()> {
    with_profile(store, profile_id, |profile| {
        apply_session_time(profile, duration_ms, Local::now());
    })
}

pub fn start_session(
    store: &ProfileStore,
    profile_id: &str,
    mode: PracticeMode,
    category: &str,
) -> StoreResult<String> {
    let mut session_id = String::new();
    with_profile(store, profile_id, |profile| {
        session_id = apply_session_start(profile, mode, category, Local::now());
    })?;
    Ok(session_id)
}

pub fn end_session(
    store: &ProfileStore,
    profile_id: &str,
    session_id: &str,
    items_attempted: u32,
    items_correct: u32,
) -> StoreResult<bool> {
    let mut finalized = false;
    with_profile(store, profile_id, |profile| {
        finalized =
            apply_session_end(profile, session_id, items_attempted, items_correct, Local::now());
    })?;
    Ok(finalized)
}

fn with_profile(
    store: &ProfileStore,
    profile_id: &str,
    mutate: impl FnOnce(&mut Profile),
) -> StoreResult<()> {
    let mut profiles = store.load_profiles()?;
    let profile = profiles
        .get_mut(profile_id)
        .ok_or_else(|| StoreError::ProfileNotFound(profile_id.to_string()))?;
    mutate(profile);
    store.save_profiles(&profiles)
}
