use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("version conflict on task {task_id}: expected {expected}, found {actual}")]
    VersionConflict {
        task_id: String,
        expected: u32,
        actual: u32,
    },
    #[error("runtime lock poisoned: {0}")]
    LockPoisoned(String),
}
