//! Calendar-day streaks over completed focus sessions.
//!
//! Every session is bucketed into a day key using one timezone for the whole
//! collection, regardless of where the session was recorded.

use crate::domain::models::{Session, StreakData};
use chrono::{DateTime, Local, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserTimezone {
    Named(Tz),
    SystemLocal,
}

impl UserTimezone {
    /// Resolves a stored preference. Blank or unknown names fall back to the
    /// system zone.
    pub fn resolve(preference: Option<&str>) -> Self {
        let Some(name) = preference.map(str::trim).filter(|value| !value.is_empty()) else {
            return Self::SystemLocal;
        };
        match name.parse::<Tz>() {
            Ok(tz) => Self::Named(tz),
            Err(error) => {
                tracing::warn!(timezone = name, %error, "unknown timezone preference, using system zone");
                Self::SystemLocal
            }
        }
    }

    pub fn day_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::Named(tz) => instant.with_timezone(tz).date_naive(),
            Self::SystemLocal => instant.with_timezone(&Local).date_naive(),
        }
    }
}

impl fmt::Display for UserTimezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(tz) => f.write_str(tz.name()),
            Self::SystemLocal => f.write_str("local"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct DailyActivity {
    pub sessions: u32,
    pub focus_minutes: u64,
}

fn active_days(sessions: &[Session], timezone: UserTimezone) -> BTreeSet<NaiveDate> {
    sessions
        .iter()
        .filter(|session| session.completed)
        .map(|session| timezone.day_of(session.completed_at))
        .collect()
}

/// Computes the current and longest streak as of `now`.
///
/// Incomplete sessions are ignored and several sessions on the same day
/// count once. The current streak is 0 unless today has activity.
pub fn calculate_streak(
    sessions: &[Session],
    timezone: UserTimezone,
    now: DateTime<Utc>,
) -> StreakData {
    let days = active_days(sessions, timezone);
    let Some(last_active_date) = days.last().copied() else {
        return StreakData::default();
    };

    let mut current = 0;
    let mut cursor = timezone.day_of(now);
    while days.contains(&cursor) {
        current += 1;
        match cursor.pred_opt() {
            Some(previous) => cursor = previous,
            None => break,
        }
    }

    let mut longest = 1;
    let mut run = 1;
    let mut previous: Option<NaiveDate> = None;
    for day in days.iter().rev() {
        if let Some(later) = previous {
            if (later - *day).num_days() == 1 {
                run += 1;
            } else {
                run = 1;
            }
            longest = longest.max(run);
        }
        previous = Some(*day);
    }

    let streak = StreakData {
        current,
        longest,
        last_active_date: Some(last_active_date),
    };
    tracing::debug!(
        %timezone,
        current = streak.current,
        longest = streak.longest,
        "calculated streak"
    );
    streak
}

/// Per-day session count and focus minutes, keyed the same way as streaks.
pub fn daily_activity(
    sessions: &[Session],
    timezone: UserTimezone,
) -> BTreeMap<NaiveDate, DailyActivity> {
    let mut days = BTreeMap::<NaiveDate, DailyActivity>::new();
    for session in sessions.iter().filter(|session| session.completed) {
        let entry = days.entry(timezone.day_of(session.completed_at)).or_default();
        entry.sessions += 1;
        entry.focus_minutes += u64::from(session.duration_minutes);
    }
    days
}

/// True when yesterday had activity but today has none yet, i.e. the streak
/// breaks unless a session is completed before midnight.
pub fn is_streak_at_risk(sessions: &[Session], timezone: UserTimezone, now: DateTime<Utc>) -> bool {
    let days = active_days(sessions, timezone);
    let today = timezone.day_of(now);
    if days.contains(&today) {
        return false;
    }
    today
        .pred_opt()
        .is_some_and(|yesterday| days.contains(&yesterday))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    const UTC: UserTimezone = UserTimezone::Named(Tz::UTC);

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn session_at(id: usize, completed_at: DateTime<Utc>) -> Session {
        Session {
            id: format!("ses-{id}"),
            user_id: "usr-1".to_string(),
            completed_at,
            duration_minutes: 25,
            completed: true,
        }
    }

    fn sessions_on_days_ago(now: DateTime<Utc>, days_ago: &[i64]) -> Vec<Session> {
        days_ago
            .iter()
            .enumerate()
            .map(|(index, offset)| session_at(index, now - Duration::days(*offset)))
            .collect()
    }

    fn now() -> DateTime<Utc> {
        fixed_time("2026-02-16T15:00:00Z")
    }

    #[test]
    fn empty_input_yields_zero_streak() {
        let streak = calculate_streak(&[], UTC, now());
        assert_eq!(
            streak,
            StreakData {
                current: 0,
                longest: 0,
                last_active_date: None,
            }
        );
    }

    #[test]
    fn sessions_on_the_same_day_collapse() {
        let sessions = vec![
            session_at(1, fixed_time("2026-02-16T08:00:00Z")),
            session_at(2, fixed_time("2026-02-16T11:30:00Z")),
            session_at(3, fixed_time("2026-02-16T14:45:00Z")),
        ];
        let streak = calculate_streak(&sessions, UTC, now());
        assert_eq!(streak.current, 1);
        assert_eq!(streak.longest, 1);
        assert_eq!(streak.last_active_date, NaiveDate::from_ymd_opt(2026, 2, 16));
    }

    #[test]
    fn consecutive_days_ending_today() {
        let sessions = sessions_on_days_ago(now(), &[0, 1, 2]);
        let streak = calculate_streak(&sessions, UTC, now());
        assert_eq!(streak.current, 3);
        assert_eq!(streak.longest, 3);
    }

    #[test]
    fn broken_chain_does_not_join_runs() {
        let sessions = sessions_on_days_ago(now(), &[0, 3]);
        let streak = calculate_streak(&sessions, UTC, now());
        assert_eq!(streak.current, 1);
        assert_eq!(streak.longest, 1);
    }

    #[test]
    fn longest_is_independent_of_current() {
        let sessions = sessions_on_days_ago(now(), &[10, 0, 9, 8]);
        let streak = calculate_streak(&sessions, UTC, now());
        assert_eq!(streak.current, 1);
        assert_eq!(streak.longest, 3);
    }

    #[test]
    fn no_activity_today_means_no_current_streak() {
        let sessions = sessions_on_days_ago(now(), &[1, 2]);
        let streak = calculate_streak(&sessions, UTC, now());
        assert_eq!(streak.current, 0);
        assert_eq!(streak.longest, 2);
        assert!(is_streak_at_risk(&sessions, UTC, now()));
    }

    #[test]
    fn incomplete_sessions_are_ignored() {
        let mut sessions = sessions_on_days_ago(now(), &[0, 1]);
        sessions[1].completed = false;
        let streak = calculate_streak(&sessions, UTC, now());
        assert_eq!(streak.current, 1);
        assert_eq!(streak.longest, 1);
    }

    #[test]
    fn timezone_shifts_day_boundaries() {
        let tokyo = UserTimezone::resolve(Some("Asia/Tokyo"));
        assert_eq!(tokyo, UserTimezone::Named(chrono_tz::Asia::Tokyo));

        // 16:00Z is already the next calendar day in Tokyo.
        let sessions = vec![
            session_at(1, fixed_time("2026-02-15T10:00:00Z")),
            session_at(2, fixed_time("2026-02-15T16:00:00Z")),
        ];
        let today_in_tokyo = fixed_time("2026-02-16T01:00:00Z");

        let in_utc = calculate_streak(&sessions, UTC, today_in_tokyo);
        assert_eq!(in_utc.longest, 1);
        assert_eq!(in_utc.current, 0);

        let in_tokyo = calculate_streak(&sessions, tokyo, today_in_tokyo);
        assert_eq!(in_tokyo.longest, 2);
        assert_eq!(in_tokyo.current, 2);
        assert_eq!(in_tokyo.last_active_date, NaiveDate::from_ymd_opt(2026, 2, 16));
    }

    #[test]
    fn unknown_or_blank_timezone_falls_back_to_system_zone() {
        assert_eq!(UserTimezone::resolve(None), UserTimezone::SystemLocal);
        assert_eq!(UserTimezone::resolve(Some("  ")), UserTimezone::SystemLocal);
        assert_eq!(UserTimezone::resolve(Some("Mars/Olympus")), UserTimezone::SystemLocal);
    }

    #[test]
    fn daily_activity_sums_focus_minutes_per_day() {
        let mut sessions = vec![
            session_at(1, fixed_time("2026-02-16T08:00:00Z")),
            session_at(2, fixed_time("2026-02-16T09:00:00Z")),
            session_at(3, fixed_time("2026-02-14T09:00:00Z")),
        ];
        sessions[1].duration_minutes = 50;

        let days = daily_activity(&sessions, UTC);
        assert_eq!(days.len(), 2);
        let today = days
            .get(&NaiveDate::from_ymd_opt(2026, 2, 16).expect("valid date"))
            .expect("today bucket");
        assert_eq!(today.sessions, 2);
        assert_eq!(today.focus_minutes, 75);
    }

    #[test]
    fn streak_is_not_at_risk_once_today_has_activity() {
        let sessions = sessions_on_days_ago(now(), &[0, 1]);
        assert!(!is_streak_at_risk(&sessions, UTC, now()));
        assert!(!is_streak_at_risk(&[], UTC, now()));
    }

    proptest! {
        #[test]
        fn streak_bounds_hold(offsets in proptest::collection::vec(0i64..60, 0..40)) {
            let sessions = sessions_on_days_ago(now(), &offsets);
            let distinct = offsets.iter().collect::<BTreeSet<_>>().len() as u32;
            let streak = calculate_streak(&sessions, UTC, now());

            prop_assert!(streak.current <= streak.longest);
            prop_assert!(streak.longest <= distinct);
            prop_assert_eq!(streak.last_active_date.is_some(), !offsets.is_empty());
        }
    }
}
