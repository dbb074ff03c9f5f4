pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::categorization::{
    CategorizedTasks, TaskStats, calculate_stats, categorize_tasks, detect_failures,
};
pub use domain::hierarchy::{TaskForest, TaskNode, build_hierarchy, flatten};
pub use domain::models::{
    Recurrence, RecurrencePattern, Session, StreakData, Task, TaskStatus,
};
pub use domain::recurrence::{next_instance, next_occurrence};
pub use domain::streak::{
    DailyActivity, UserTimezone, calculate_streak, daily_activity, is_streak_at_risk,
};
pub use infrastructure::error::InfraError;
pub use infrastructure::logging::init_tracing;
