use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    #[serde(alias = "in-progress")]
    InProgress,
    Done,
    Postponed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_open(self) -> bool {
        matches!(self, Self::Todo | Self::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Postponed => "postponed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecurrencePattern {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recurrence {
    pub pattern: RecurrencePattern,
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(default)]
    pub days_of_week: Vec<Weekday>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl Recurrence {
    pub fn validate(&self) -> Result<(), String> {
        if self.interval == 0 {
            return Err("recurrence.interval must be > 0".to_string());
        }
        if self.pattern == RecurrencePattern::Custom && self.days_of_week.is_empty() {
            return Err("recurrence.days_of_week must not be empty for custom pattern".to_string());
        }
        Ok(())
    }
}

fn default_interval() -> u32 {
    1
}

/// A completed (or abandoned) focus session as recorded by the timer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub completed_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub completed: bool,
}

impl Session {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "session.id")?;
        validate_non_empty(&self.user_id, "session.user_id")?;
        Ok(())
    }
}

/// A task record. `status` is the single source of truth for completion;
/// the legacy `completed` flag only exists on the wire and is folded into
/// `status` when a record is read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "TaskRecord", into = "TaskRecord")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub start_date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub parent_id: Option<String>,
    pub progress: u8,
    pub order: i32,
    pub recurrence: Option<Recurrence>,
    pub version: u32,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status: TaskStatus::Todo,
            created_at,
            completed_at: None,
            failed_at: None,
            due_at: None,
            start_date: None,
            start_time: None,
            end_time: None,
            parent_id: None,
            progress: 0,
            order: 0,
            recurrence: None,
            version: 1,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Done
    }

    pub fn is_failed(&self) -> bool {
        self.failed_at.is_some()
    }

    /// Write side of the `completed` alias. Completing stamps `completed_at`
    /// and clears any failure; reopening a done task moves it back to todo.
    pub fn set_completed(&mut self, completed: bool, now: DateTime<Utc>) {
        if completed {
            if !self.is_completed() {
                self.completed_at = Some(now);
            }
            self.status = TaskStatus::Done;
            self.failed_at = None;
            self.progress = 100;
        } else if self.is_completed() {
            self.status = TaskStatus::Todo;
            self.completed_at = None;
        }
    }

    pub fn parent_ref(&self) -> Option<&str> {
        self.parent_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.title, "task.title")?;
        if self.progress > 100 {
            return Err("task.progress must be <= 100".to_string());
        }
        if self.version == 0 {
            return Err("task.version must be >= 1".to_string());
        }
        if self.parent_ref() == Some(self.id.trim()) {
            return Err("task.parent_id must not reference the task itself".to_string());
        }
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if end <= start {
                return Err("task.end_time must be after task.start_time".to_string());
            }
        }
        if self.is_completed() && self.is_failed() {
            return Err("task.failed_at must be empty for a done task".to_string());
        }
        if let Some(recurrence) = &self.recurrence {
            recurrence.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TaskRecord {
    id: String,
    title: String,
    #[serde(default)]
    status: Option<TaskStatus>,
    #[serde(default)]
    completed: bool,
    created_at: DateTime<Utc>,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    failed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    start_date: Option<NaiveDate>,
    #[serde(default)]
    start_time: Option<NaiveTime>,
    #[serde(default)]
    end_time: Option<NaiveTime>,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    progress: u8,
    #[serde(default)]
    order: i32,
    #[serde(default)]
    recurrence: Option<Recurrence>,
    #[serde(default = "initial_version")]
    version: u32,
}

fn initial_version() -> u32 {
    1
}

impl From<TaskRecord> for Task {
    fn from(record: TaskRecord) -> Self {
        let status = match (record.status, record.completed) {
            (_, true) => TaskStatus::Done,
            (Some(status), false) => status,
            (None, false) => TaskStatus::Todo,
        };
        Self {
            id: record.id,
            title: record.title,
            status,
            created_at: record.created_at,
            completed_at: record.completed_at,
            failed_at: record.failed_at,
            due_at: record.due_at,
            start_date: record.start_date,
            start_time: record.start_time,
            end_time: record.end_time,
            parent_id: record.parent_id,
            progress: record.progress,
            order: record.order,
            recurrence: record.recurrence,
            version: record.version,
        }
    }
}

impl From<Task> for TaskRecord {
    fn from(task: Task) -> Self {
        Self {
            completed: task.is_completed(),
            id: task.id,
            title: task.title,
            status: Some(task.status),
            created_at: task.created_at,
            completed_at: task.completed_at,
            failed_at: task.failed_at,
            due_at: task.due_at,
            start_date: task.start_date,
            start_time: task.start_time,
            end_time: task.end_time,
            parent_id: task.parent_id,
            progress: task.progress,
            order: task.order,
            recurrence: task.recurrence,
            version: task.version,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreakData {
    pub current: u32,
    pub longest: u32,
    pub last_active_date: Option<NaiveDate>,
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
