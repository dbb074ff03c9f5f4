use crate::application::bootstrap::bootstrap_workspace;
use crate::domain::categorization::{TaskStats, calculate_stats, categorize_tasks, detect_failures};
use crate::domain::hierarchy::{TaskForest, build_hierarchy};
use crate::domain::models::{Recurrence, Session, Task, TaskStatus};
use crate::domain::recurrence::next_instance;
use crate::domain::streak::{UserTimezone, calculate_streak, daily_activity, is_streak_at_risk};
use crate::infrastructure::config::{read_timezone, read_upcoming_window_days, save_timezone};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::snapshot::{SESSIONS_JSON, TASKS_JSON, read_snapshot, write_snapshot};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

const STREAK_HISTORY_DAYS: i64 = 30;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

pub struct AppState {
    config_dir: PathBuf,
    state_dir: PathBuf,
    logs_dir: PathBuf,
    runtime: Mutex<RuntimeState>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let tasks: Vec<Task> = read_snapshot(&bootstrap.state_dir.join(TASKS_JSON))?;
        let sessions: Vec<Session> = read_snapshot(&bootstrap.state_dir.join(SESSIONS_JSON))?;

        let mut runtime = RuntimeState {
            sessions,
            ..RuntimeState::default()
        };
        for task in tasks {
            if runtime.tasks.contains(&task.id) {
                tracing::warn!(task_id = %task.id, "duplicate task id in snapshot, keeping first");
                continue;
            }
            runtime.tasks.insert(task);
        }
        tracing::info!(
            tasks = runtime.tasks.by_id.len(),
            sessions = runtime.sessions.len(),
            "loaded workspace state"
        );

        Ok(Self {
            config_dir: bootstrap.config_dir,
            state_dir: bootstrap.state_dir,
            logs_dir: bootstrap.logs_dir,
            runtime: Mutex::new(runtime),
            log_guard: Mutex::new(()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }

    fn timezone(&self) -> Result<UserTimezone, InfraError> {
        let preference = read_timezone(&self.config_dir)?;
        Ok(UserTimezone::resolve(preference.as_deref()))
    }

    fn persist_tasks(&self, table: &TaskTable) -> Result<(), InfraError> {
        write_snapshot(&self.state_dir.join(TASKS_JSON), &table.ordered())
    }

    fn persist_sessions(&self, sessions: &[Session]) -> Result<(), InfraError> {
        write_snapshot(&self.state_dir.join(SESSIONS_JSON), sessions)
    }
}

/// In-memory copy of the snapshots. Mutating commands edit a clone of the
/// affected collection and swap it in only after the snapshot write succeeds,
/// so a failed write leaves memory matching disk.
#[derive(Debug, Default)]
struct RuntimeState {
    tasks: TaskTable,
    sessions: Vec<Session>,
}

#[derive(Debug, Clone, Default)]
struct TaskTable {
    by_id: HashMap<String, Task>,
    order: Vec<String>,
}

impl TaskTable {
    fn get(&self, task_id: &str) -> Option<&Task> {
        self.by_id.get(task_id)
    }

    fn contains(&self, task_id: &str) -> bool {
        self.by_id.contains_key(task_id)
    }

    fn ordered(&self) -> Vec<Task> {
        self.order
            .iter()
            .filter_map(|task_id| self.by_id.get(task_id).cloned())
            .collect()
    }

    fn insert(&mut self, task: Task) {
        if !self.by_id.contains_key(&task.id) {
            self.order.push(task.id.clone());
        }
        self.by_id.insert(task.id.clone(), task);
    }

    fn remove(&mut self, task_id: &str) -> Option<Task> {
        let removed = self.by_id.remove(task_id)?;
        self.order.retain(|candidate| candidate != task_id);
        Some(removed)
    }
}

/// Partial update for `update_task_impl`. For `due_at` and `parent_id` an
/// empty string clears the field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub status: Option<TaskStatus>,
    pub due_at: Option<String>,
    pub parent_id: Option<String>,
    pub progress: Option<u8>,
    pub order: Option<i32>,
    pub recurrence: Option<Recurrence>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateTaskResponse {
    pub task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_occurrence: Option<Task>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyActivityItem {
    pub date: String,
    pub sessions: u32,
    pub focus_minutes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreakResponse {
    pub timezone: String,
    pub current: u32,
    pub longest: u32,
    pub last_active_date: Option<String>,
    pub at_risk: bool,
    pub recent_days: Vec<DailyActivityItem>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CategorizedTasksResponse {
    pub active: Vec<String>,
    pub in_progress: Vec<String>,
    pub upcoming: Vec<String>,
    pub completed: Vec<String>,
    pub failed: Vec<String>,
    pub overdue: Vec<String>,
    pub postponed: Vec<String>,
    pub cancelled: Vec<String>,
}

pub fn create_task_impl(
    state: &AppState,
    title: String,
    parent_id: Option<String>,
    due_at: Option<String>,
    order: Option<i32>,
) -> Result<Task, InfraError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(InfraError::InvalidInput("title must not be empty".to_string()));
    }
    let parent_id = parent_id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned);
    let due_at = due_at
        .as_deref()
        .map(|raw| parse_datetime_input(raw, "due_at"))
        .transpose()?;

    let mut runtime = lock_runtime(state)?;
    if let Some(parent_id) = parent_id.as_deref() {
        if !runtime.tasks.contains(parent_id) {
            return Err(InfraError::NotFound {
                kind: "parent task",
                id: parent_id.to_string(),
            });
        }
    }
    let order = order.unwrap_or_else(|| {
        runtime
            .tasks
            .by_id
            .values()
            .filter(|candidate| candidate.parent_ref() == parent_id.as_deref())
            .count() as i32
    });

    let mut task = Task::new(next_id("tsk"), title, Utc::now());
    task.parent_id = parent_id;
    task.due_at = due_at;
    task.order = order;
    task.validate().map_err(InfraError::InvalidInput)?;

    let mut staged = runtime.tasks.clone();
    staged.insert(task.clone());
    state.persist_tasks(&staged)?;
    runtime.tasks = staged;
    drop(runtime);

    state.log_info("create_task", &format!("created task_id={}", task.id));
    Ok(task)
}

pub fn list_tasks_impl(state: &AppState) -> Result<Vec<Task>, InfraError> {
    let runtime = lock_runtime(state)?;
    let mut tasks = runtime.tasks.ordered();
    tasks.sort_by(|left, right| left.created_at.cmp(&right.created_at));
    Ok(tasks)
}

/// Applies `patch` if the stored version still equals `expected_version`.
/// Completing a recurring task also creates its next instance.
pub fn update_task_impl(
    state: &AppState,
    task_id: String,
    expected_version: u32,
    patch: TaskPatch,
) -> Result<UpdateTaskResponse, InfraError> {
    let task_id = task_id.trim();
    if task_id.is_empty() {
        return Err(InfraError::InvalidInput("task_id must not be empty".to_string()));
    }
    let now = Utc::now();

    let mut runtime = lock_runtime(state)?;
    let Some(current) = runtime.tasks.get(task_id) else {
        return Err(InfraError::NotFound {
            kind: "task",
            id: task_id.to_string(),
        });
    };
    if current.version != expected_version {
        return Err(InfraError::VersionConflict {
            task_id: task_id.to_string(),
            expected: expected_version,
            actual: current.version,
        });
    }
    let was_completed = current.is_completed();
    let mut task = current.clone();

    if let Some(title) = patch.title {
        let title = title.trim();
        if title.is_empty() {
            return Err(InfraError::InvalidInput("title must not be empty".to_string()));
        }
        task.title = title.to_string();
    }

    if let Some(raw) = patch.due_at {
        task.due_at = match raw.trim() {
            "" => None,
            value => Some(parse_datetime_input(value, "due_at")?),
        };
    }

    if let Some(raw) = patch.parent_id {
        let parent_id = raw.trim();
        if parent_id.is_empty() {
            task.parent_id = None;
        } else {
            ensure_parent_allowed(&runtime.tasks.by_id, task_id, parent_id)?;
            task.parent_id = Some(parent_id.to_string());
        }
    }

    if let Some(progress) = patch.progress {
        task.progress = progress;
    }
    if let Some(order) = patch.order {
        task.order = order;
    }
    if let Some(recurrence) = patch.recurrence {
        task.recurrence = Some(recurrence);
    }

    if let Some(status) = patch.status {
        if status == TaskStatus::Done {
            task.set_completed(true, now);
        } else {
            task.set_completed(false, now);
            task.status = status;
        }
    }

    task.validate().map_err(InfraError::InvalidInput)?;
    task.version += 1;

    let next_occurrence = if task.is_completed() && !was_completed {
        next_instance(&task, next_id("tsk"), now)
    } else {
        None
    };

    let mut staged = runtime.tasks.clone();
    staged.insert(task.clone());
    if let Some(next) = &next_occurrence {
        staged.insert(next.clone());
    }
    state.persist_tasks(&staged)?;
    runtime.tasks = staged;
    drop(runtime);

    state.log_info(
        "update_task",
        &format!("updated task_id={task_id} version={}", task.version),
    );
    if let Some(next) = &next_occurrence {
        state.log_info(
            "update_task",
            &format!("scheduled next occurrence task_id={}", next.id),
        );
    }
    Ok(UpdateTaskResponse {
        task,
        next_occurrence,
    })
}

/// Removes a task. Its direct children become roots instead of dangling.
pub fn delete_task_impl(state: &AppState, task_id: String) -> Result<bool, InfraError> {
    let task_id = task_id.trim();
    if task_id.is_empty() {
        return Err(InfraError::InvalidInput("task_id must not be empty".to_string()));
    }

    let mut runtime = lock_runtime(state)?;
    let mut staged = runtime.tasks.clone();
    if staged.remove(task_id).is_none() {
        return Ok(false);
    }

    let mut promoted = 0;
    for task in staged.by_id.values_mut() {
        if task.parent_ref() == Some(task_id) {
            task.parent_id = None;
            task.version += 1;
            promoted += 1;
        }
    }
    state.persist_tasks(&staged)?;
    runtime.tasks = staged;
    drop(runtime);

    state.log_info(
        "delete_task",
        &format!("deleted task_id={task_id} promoted_children={promoted}"),
    );
    Ok(true)
}

pub fn record_session_impl(
    state: &AppState,
    user_id: String,
    completed_at: Option<String>,
    duration_minutes: u32,
    completed: bool,
) -> Result<Session, InfraError> {
    let completed_at = match completed_at {
        Some(raw) => parse_datetime_input(&raw, "completed_at")?,
        None => Utc::now(),
    };
    let session = Session {
        id: next_id("ses"),
        user_id: user_id.trim().to_string(),
        completed_at,
        duration_minutes,
        completed,
    };
    session.validate().map_err(InfraError::InvalidInput)?;

    let mut runtime = lock_runtime(state)?;
    let mut staged = runtime.sessions.clone();
    staged.push(session.clone());
    state.persist_sessions(&staged)?;
    runtime.sessions = staged;
    drop(runtime);

    state.log_info("record_session", &format!("recorded session_id={}", session.id));
    Ok(session)
}

pub fn list_sessions_impl(state: &AppState) -> Result<Vec<Session>, InfraError> {
    let runtime = lock_runtime(state)?;
    let mut sessions = runtime.sessions.clone();
    sessions.sort_by(|left, right| left.completed_at.cmp(&right.completed_at));
    Ok(sessions)
}

pub fn get_streak_impl(state: &AppState, now: Option<String>) -> Result<StreakResponse, InfraError> {
    let now = resolve_now(now)?;
    let timezone = state.timezone()?;
    let runtime = lock_runtime(state)?;

    let streak = calculate_streak(&runtime.sessions, timezone, now);
    let at_risk = is_streak_at_risk(&runtime.sessions, timezone, now);
    let since = timezone.day_of(now - Duration::days(STREAK_HISTORY_DAYS));
    let recent_days = daily_activity(&runtime.sessions, timezone)
        .range(since..)
        .map(|(date, activity)| DailyActivityItem {
            date: format_day(*date),
            sessions: activity.sessions,
            focus_minutes: activity.focus_minutes,
        })
        .collect();

    Ok(StreakResponse {
        timezone: timezone.to_string(),
        current: streak.current,
        longest: streak.longest,
        last_active_date: streak.last_active_date.map(format_day),
        at_risk,
        recent_days,
    })
}

pub fn categorize_tasks_impl(
    state: &AppState,
    now: Option<String>,
) -> Result<CategorizedTasksResponse, InfraError> {
    let now = resolve_now(now)?;
    let runtime = lock_runtime(state)?;
    let tasks = runtime.tasks.ordered();
    let categorized = categorize_tasks(&tasks, now);

    let ids = |bucket: &[&Task]| bucket.iter().map(|task| task.id.clone()).collect::<Vec<_>>();
    Ok(CategorizedTasksResponse {
        active: ids(&categorized.active),
        in_progress: ids(&categorized.in_progress),
        upcoming: ids(&categorized.upcoming),
        completed: ids(&categorized.completed),
        failed: ids(&categorized.failed),
        overdue: ids(&categorized.overdue),
        postponed: ids(&categorized.postponed),
        cancelled: ids(&categorized.cancelled),
    })
}

pub fn get_task_stats_impl(state: &AppState, now: Option<String>) -> Result<TaskStats, InfraError> {
    let now = resolve_now(now)?;
    let runtime = lock_runtime(state)?;
    Ok(calculate_stats(&runtime.tasks.ordered(), now))
}

pub fn get_task_tree_impl(state: &AppState) -> Result<TaskForest, InfraError> {
    let runtime = lock_runtime(state)?;
    let mut forest = build_hierarchy(&runtime.tasks.ordered());
    drop(runtime);

    forest.rollup_progress();
    if !forest.cycles.is_empty() {
        state.log_error(
            "get_task_tree",
            &format!("parent cycles broken at task_ids={}", forest.cycles.join(",")),
        );
    }
    Ok(forest)
}

/// Marks every open task whose due instant has passed as failed and returns
/// the affected ids.
pub fn sweep_failures_impl(state: &AppState, now: Option<String>) -> Result<Vec<String>, InfraError> {
    let now = resolve_now(now)?;
    let mut runtime = lock_runtime(state)?;
    let tasks = runtime.tasks.ordered();
    let failed_ids = detect_failures(&tasks, now)
        .into_iter()
        .map(|task| task.id.clone())
        .collect::<Vec<_>>();
    if failed_ids.is_empty() {
        return Ok(failed_ids);
    }

    let mut staged = runtime.tasks.clone();
    for task_id in &failed_ids {
        if let Some(task) = staged.by_id.get_mut(task_id) {
            task.failed_at = Some(now);
            task.version += 1;
        }
    }
    state.persist_tasks(&staged)?;
    runtime.tasks = staged;
    drop(runtime);

    state.log_info(
        "sweep_failures",
        &format!("marked {} overdue task(s) failed", failed_ids.len()),
    );
    Ok(failed_ids)
}

/// Upcoming tasks due within the configured window, soonest first.
pub fn list_upcoming_impl(state: &AppState, now: Option<String>) -> Result<Vec<Task>, InfraError> {
    let now = resolve_now(now)?;
    let window_days = read_upcoming_window_days(&state.config_dir)?;
    let horizon = now + Duration::days(i64::from(window_days));

    let runtime = lock_runtime(state)?;
    let tasks = runtime.tasks.ordered();
    let mut upcoming = categorize_tasks(&tasks, now)
        .upcoming
        .into_iter()
        .filter(|task| task.due_at.is_some_and(|due_at| due_at <= horizon))
        .cloned()
        .collect::<Vec<_>>();
    upcoming.sort_by(|left, right| left.due_at.cmp(&right.due_at));
    Ok(upcoming)
}

/// Stores the timezone preference and returns the zone now in effect.
pub fn set_timezone_impl(state: &AppState, timezone: Option<String>) -> Result<String, InfraError> {
    let name = timezone
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(name) = name {
        name.parse::<Tz>().map_err(|error| {
            InfraError::InvalidInput(format!("unknown timezone {name}: {error}"))
        })?;
    }
    save_timezone(&state.config_dir, name)?;
    let resolved = state.timezone()?;
    state.log_info("set_timezone", &format!("timezone={resolved}"));
    Ok(resolved.to_string())
}

fn lock_runtime(state: &AppState) -> Result<MutexGuard<'_, RuntimeState>, InfraError> {
    state
        .runtime
        .lock()
        .map_err(|error| InfraError::LockPoisoned(error.to_string()))
}

fn ensure_parent_allowed(
    tasks: &HashMap<String, Task>,
    task_id: &str,
    parent_id: &str,
) -> Result<(), InfraError> {
    if parent_id == task_id {
        return Err(InfraError::InvalidInput(
            "task cannot be its own parent".to_string(),
        ));
    }
    if !tasks.contains_key(parent_id) {
        return Err(InfraError::NotFound {
            kind: "parent task",
            id: parent_id.to_string(),
        });
    }

    let mut visited = HashSet::new();
    let mut cursor = Some(parent_id);
    while let Some(current) = cursor {
        if current == task_id {
            return Err(InfraError::InvalidInput(format!(
                "parent {parent_id} would create a cycle"
            )));
        }
        if !visited.insert(current) {
            break;
        }
        cursor = tasks.get(current).and_then(Task::parent_ref);
    }
    Ok(())
}

fn resolve_now(now: Option<String>) -> Result<DateTime<Utc>, InfraError> {
    match now {
        Some(raw) => parse_datetime_input(&raw, "now"),
        None => Ok(Utc::now()),
    }
}

fn parse_datetime_input(value: &str, field_name: &str) -> Result<DateTime<Utc>, InfraError> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    }
    Err(InfraError::InvalidInput(format!(
        "{field_name} must be RFC3339 or YYYY-MM-DD"
    )))
}

fn format_day(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
