pub mod categorization;
pub mod hierarchy;
pub mod models;
pub mod recurrence;
pub mod streak;
