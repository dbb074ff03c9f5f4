use crate::domain::models::{Recurrence, RecurrencePattern, Task, TaskStatus};
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc, Weekday};

/// Next date strictly after `from` on which the recurrence fires, or `None`
/// once the end date has passed.
pub fn next_occurrence(recurrence: &Recurrence, from: NaiveDate) -> Option<NaiveDate> {
    let interval = recurrence.interval.max(1);
    let candidate = match recurrence.pattern {
        RecurrencePattern::Daily => from.checked_add_signed(Duration::days(i64::from(interval))),
        RecurrencePattern::Weekly if recurrence.days_of_week.is_empty() => {
            from.checked_add_signed(Duration::weeks(i64::from(interval)))
        }
        RecurrencePattern::Weekly | RecurrencePattern::Custom => {
            next_weekday_match(&recurrence.days_of_week, interval, from)
        }
        RecurrencePattern::Monthly => from.checked_add_months(Months::new(interval)),
        RecurrencePattern::Yearly => from.checked_add_months(Months::new(interval.saturating_mul(12))),
    }?;

    match recurrence.end_date {
        Some(end_date) if candidate > end_date => None,
        _ => Some(candidate),
    }
}

/// Remaining matching days in the current Monday-based week first, then the
/// first matching day `interval` weeks later.
fn next_weekday_match(days: &[Weekday], interval: u32, from: NaiveDate) -> Option<NaiveDate> {
    if days.is_empty() {
        return None;
    }
    let days_into_week = i64::from(from.weekday().num_days_from_monday());
    for offset in 1..(7 - days_into_week) {
        let candidate = from.checked_add_signed(Duration::days(offset))?;
        if days.contains(&candidate.weekday()) {
            return Some(candidate);
        }
    }

    let week_start = from.checked_sub_signed(Duration::days(days_into_week))?;
    let next_week = week_start.checked_add_signed(Duration::weeks(i64::from(interval)))?;
    (0..7)
        .filter_map(|offset| next_week.checked_add_signed(Duration::days(offset)))
        .find(|candidate| days.contains(&candidate.weekday()))
}

/// Builds the follow-on instance of a recurring task. The due instant and
/// start date move by the same number of days; the time of day is kept.
/// Returns `None` for non-recurring tasks or when the series has ended.
pub fn next_instance(task: &Task, id: String, now: DateTime<Utc>) -> Option<Task> {
    let recurrence = task.recurrence.as_ref()?;
    let anchor = task
        .due_at
        .map(|due_at| due_at.date_naive())
        .or(task.start_date)
        .unwrap_or_else(|| now.date_naive());
    let next = next_occurrence(recurrence, anchor)?;
    let shift = next - anchor;

    Some(Task {
        id,
        title: task.title.clone(),
        status: TaskStatus::Todo,
        created_at: now,
        completed_at: None,
        failed_at: None,
        due_at: task.due_at.map(|due_at| due_at + shift),
        start_date: task.start_date.map(|start_date| start_date + shift),
        start_time: task.start_time,
        end_time: task.end_time,
        parent_id: task.parent_id.clone(),
        progress: 0,
        order: task.order,
        recurrence: Some(recurrence.clone()),
        version: 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn recurrence(pattern: RecurrencePattern, interval: u32, days: Vec<Weekday>) -> Recurrence {
        Recurrence {
            pattern,
            interval,
            days_of_week: days,
            end_date: None,
        }
    }

    #[test]
    fn daily_and_weekly_step_by_interval() {
        let from = date(2026, 2, 16);
        assert_eq!(
            next_occurrence(&recurrence(RecurrencePattern::Daily, 3, Vec::new()), from),
            Some(date(2026, 2, 19))
        );
        assert_eq!(
            next_occurrence(&recurrence(RecurrencePattern::Weekly, 2, Vec::new()), from),
            Some(date(2026, 3, 2))
        );
    }

    #[test]
    fn monthly_clamps_to_end_of_shorter_month() {
        let rule = recurrence(RecurrencePattern::Monthly, 1, Vec::new());
        assert_eq!(next_occurrence(&rule, date(2026, 1, 31)), Some(date(2026, 2, 28)));

        let yearly = recurrence(RecurrencePattern::Yearly, 1, Vec::new());
        assert_eq!(next_occurrence(&yearly, date(2028, 2, 29)), Some(date(2029, 2, 28)));
    }

    #[test]
    fn custom_days_prefer_rest_of_current_week() {
        // 2026-02-16 is a Monday.
        let rule = recurrence(
            RecurrencePattern::Custom,
            2,
            vec![Weekday::Mon, Weekday::Thu],
        );
        assert_eq!(next_occurrence(&rule, date(2026, 2, 16)), Some(date(2026, 2, 19)));
        // From Thursday the next hit is Monday two weeks on.
        assert_eq!(next_occurrence(&rule, date(2026, 2, 19)), Some(date(2026, 3, 2)));
    }

    #[test]
    fn sunday_anchor_moves_to_following_interval_week() {
        let rule = recurrence(RecurrencePattern::Custom, 1, vec![Weekday::Sun]);
        assert_eq!(next_occurrence(&rule, date(2026, 2, 22)), Some(date(2026, 3, 1)));
    }

    #[test]
    fn end_date_stops_the_series() {
        let mut rule = recurrence(RecurrencePattern::Daily, 1, Vec::new());
        rule.end_date = Some(date(2026, 2, 16));
        assert_eq!(next_occurrence(&rule, date(2026, 2, 16)), None);
        rule.end_date = Some(date(2026, 2, 17));
        assert_eq!(next_occurrence(&rule, date(2026, 2, 16)), Some(date(2026, 2, 17)));
    }

    #[test]
    fn next_instance_shifts_due_instant_and_resets_state() {
        let now = fixed_time("2026-02-16T18:00:00Z");
        let mut task = Task::new("tsk-1", "Weekly review", fixed_time("2026-02-01T08:00:00Z"));
        task.status = TaskStatus::Done;
        task.completed_at = Some(now);
        task.due_at = Some(fixed_time("2026-02-16T17:00:00Z"));
        task.progress = 100;
        task.version = 4;
        task.recurrence = Some(recurrence(RecurrencePattern::Weekly, 1, Vec::new()));

        let next = next_instance(&task, "tsk-2".to_string(), now).expect("next instance");
        assert_eq!(next.id, "tsk-2");
        assert_eq!(next.status, TaskStatus::Todo);
        assert_eq!(next.due_at, Some(fixed_time("2026-02-23T17:00:00Z")));
        assert_eq!(next.version, 1);
        assert_eq!(next.progress, 0);
        assert!(next.completed_at.is_none());
    }

    #[test]
    fn non_recurring_task_has_no_next_instance() {
        let now = fixed_time("2026-02-16T18:00:00Z");
        let task = Task::new("tsk-1", "Once", now);
        assert!(next_instance(&task, "tsk-2".to_string(), now).is_none());
    }
}
