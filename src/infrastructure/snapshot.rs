use crate::infrastructure::error::InfraError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const TASKS_JSON: &str = "tasks.json";
pub const SESSIONS_JSON: &str = "sessions.json";

#[derive(Debug, Deserialize)]
struct Snapshot<T> {
    schema: u8,
    items: Vec<T>,
}

#[derive(Debug, Serialize)]
struct SnapshotRef<'a, T> {
    schema: u8,
    items: &'a [T],
}

/// Reads a snapshot file. A missing file is an empty collection.
pub fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, InfraError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path)?;
    let snapshot: Snapshot<T> = serde_json::from_str(&raw)?;
    if snapshot.schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            snapshot.schema,
            path.display()
        )));
    }
    Ok(snapshot.items)
}

/// Writes to a sibling `.json.tmp` file, then renames it over `path`.
pub fn write_snapshot<T: Serialize>(path: &Path, items: &[T]) -> Result<(), InfraError> {
    let snapshot = SnapshotRef { schema: 1, items };
    let formatted = serde_json::to_string_pretty(&snapshot)?;
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, format!("{formatted}\n"))?;
    fs::rename(&staging, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Session;
    use chrono::{DateTime, Utc};
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pomotask-snapshot-{}-{name}", std::process::id()))
    }

    #[test]
    fn missing_snapshot_reads_as_empty() {
        let sessions: Vec<Session> =
            read_snapshot(&temp_path("missing.json")).expect("read missing snapshot");
        assert!(sessions.is_empty());
    }

    #[test]
    fn written_snapshot_reads_back() {
        let path = temp_path("sessions.json");
        let sessions = vec![Session {
            id: "ses-1".to_string(),
            user_id: "usr-1".to_string(),
            completed_at: DateTime::parse_from_rfc3339("2026-02-16T09:25:00Z")
                .expect("valid datetime")
                .with_timezone(&Utc),
            duration_minutes: 25,
            completed: true,
        }];
        write_snapshot(&path, &sessions).expect("write snapshot");
        let loaded: Vec<Session> = read_snapshot(&path).expect("read snapshot");
        let _ = fs::remove_file(&path);
        assert_eq!(loaded, sessions);
    }

    #[test]
    fn unsupported_snapshot_schema_is_rejected() {
        let path = temp_path("future.json");
        fs::write(&path, r#"{"schema": 9, "items": []}"#).expect("write snapshot");
        let result: Result<Vec<Session>, InfraError> = read_snapshot(&path);
        let _ = fs::remove_file(&path);
        assert!(matches!(result, Err(InfraError::InvalidConfig(_))));
    }
}
