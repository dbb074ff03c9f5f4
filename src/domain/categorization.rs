use crate::domain::models::{Task, TaskStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Borrowed views over one task collection. A task can sit in several
/// buckets at once; the buckets are not a partition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategorizedTasks<'a> {
    pub active: Vec<&'a Task>,
    pub in_progress: Vec<&'a Task>,
    pub upcoming: Vec<&'a Task>,
    pub completed: Vec<&'a Task>,
    pub failed: Vec<&'a Task>,
    pub overdue: Vec<&'a Task>,
    pub postponed: Vec<&'a Task>,
    pub cancelled: Vec<&'a Task>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TaskStats {
    pub total: usize,
    pub active_tasks: usize,
    pub completed: usize,
    pub failed: usize,
    pub in_progress: usize,
    pub upcoming: usize,
    pub overdue: usize,
    pub postponed: usize,
    pub cancelled: usize,
    pub completion_rate: f64,
    pub failure_rate: f64,
}

fn is_overdue(task: &Task, now: DateTime<Utc>) -> bool {
    task.status.is_open()
        && !task.is_completed()
        && task.due_at.is_some_and(|due_at| due_at < now)
}

fn is_upcoming(task: &Task, now: DateTime<Utc>) -> bool {
    !task.is_completed() && !task.is_failed() && task.due_at.is_some_and(|due_at| due_at > now)
}

pub fn categorize_tasks(tasks: &[Task], now: DateTime<Utc>) -> CategorizedTasks<'_> {
    let mut categorized = CategorizedTasks::default();
    for task in tasks {
        if task.status.is_open() {
            categorized.active.push(task);
        }
        if task.status == TaskStatus::InProgress && !task.is_failed() {
            categorized.in_progress.push(task);
        }
        if is_upcoming(task, now) {
            categorized.upcoming.push(task);
        }
        if task.is_completed() {
            categorized.completed.push(task);
        }
        if task.is_failed() {
            categorized.failed.push(task);
        }
        if is_overdue(task, now) {
            categorized.overdue.push(task);
        }
        match task.status {
            TaskStatus::Postponed => categorized.postponed.push(task),
            TaskStatus::Cancelled => categorized.cancelled.push(task),
            _ => {}
        }
    }
    categorized
}

/// Aggregate counts and rates. Cancelled tasks are left out of the rate
/// denominator, and a task is never counted as both completed and failed:
/// completion wins, and cancelled failures do not count.
pub fn calculate_stats(tasks: &[Task], now: DateTime<Utc>) -> TaskStats {
    let categorized = categorize_tasks(tasks, now);
    let total = tasks.len();
    let cancelled = categorized.cancelled.len();
    let active_tasks = total - cancelled;
    let completed = categorized.completed.len();
    let failed = categorized
        .failed
        .iter()
        .filter(|task| !task.is_completed() && task.status != TaskStatus::Cancelled)
        .count();

    TaskStats {
        total,
        active_tasks,
        completed,
        failed,
        in_progress: categorized.in_progress.len(),
        upcoming: categorized.upcoming.len(),
        overdue: categorized.overdue.len(),
        postponed: categorized.postponed.len(),
        cancelled,
        completion_rate: percentage(completed, active_tasks),
        failure_rate: percentage(failed, active_tasks),
    }
}

/// Open tasks whose due instant has passed and that have not been marked
/// failed yet.
pub fn detect_failures(tasks: &[Task], now: DateTime<Utc>) -> Vec<&Task> {
    tasks
        .iter()
        .filter(|task| is_overdue(task, now) && !task.is_failed())
        .collect()
}

fn percentage(count: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    count as f64 / denominator as f64 * 100.0
}
