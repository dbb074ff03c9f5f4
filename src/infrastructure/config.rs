use crate::infrastructure::error::InfraError;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const DEFAULT_UPCOMING_WINDOW_DAYS: u32 = 7;

fn default_app_config() -> serde_json::Value {
    serde_json::json!({
        "schema": 1,
        "appName": "Pomotask",
        "timezone": null,
        "upcomingWindowDays": DEFAULT_UPCOMING_WINDOW_DAYS
    })
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        write_config(&path, &default_app_config())?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

fn write_config(path: &Path, value: &serde_json::Value) -> Result<(), InfraError> {
    let formatted = serde_json::to_string_pretty(value)?;
    fs::write(path, format!("{formatted}\n"))?;
    Ok(())
}

pub fn load_app_config(config_dir: &Path) -> Result<serde_json::Value, InfraError> {
    read_config(&config_dir.join(APP_JSON))
}

pub fn read_timezone(config_dir: &Path) -> Result<Option<String>, InfraError> {
    let app = load_app_config(config_dir)?;
    Ok(app
        .get("timezone")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned))
}

pub fn read_upcoming_window_days(config_dir: &Path) -> Result<u32, InfraError> {
    let app = load_app_config(config_dir)?;
    Ok(app
        .get("upcomingWindowDays")
        .and_then(serde_json::Value::as_u64)
        .and_then(|value| u32::try_from(value).ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_UPCOMING_WINDOW_DAYS))
}

/// Stores the timezone preference. `None` or a blank name clears it so the
/// system zone is used again.
pub fn save_timezone(config_dir: &Path, timezone: Option<&str>) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    let mut app = read_config(&path)?;
    let object = app.as_object_mut().ok_or_else(|| {
        InfraError::InvalidConfig(format!("invalid object structure in {}", path.display()))
    })?;
    let value = match timezone.map(str::trim).filter(|value| !value.is_empty()) {
        Some(name) => serde_json::Value::String(name.to_string()),
        None => serde_json::Value::Null,
    };
    object.insert("timezone".to_string(), value);
    write_config(&path, &app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DIR: AtomicUsize = AtomicUsize::new(0);

    struct TempDir {
        path: PathBuf,
    }

    impl TempDir {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DIR.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "pomotask-config-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp dir");
            Self { path }
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn defaults_are_written_once_and_readable() {
        let dir = TempDir::new();
        ensure_default_configs(&dir.path).expect("write defaults");
        assert_eq!(read_timezone(&dir.path).expect("read timezone"), None);
        assert_eq!(read_upcoming_window_days(&dir.path).expect("read window"), 7);

        save_timezone(&dir.path, Some("Europe/Berlin")).expect("save timezone");
        ensure_default_configs(&dir.path).expect("defaults keep existing file");
        assert_eq!(
            read_timezone(&dir.path).expect("read timezone"),
            Some("Europe/Berlin".to_string())
        );

        save_timezone(&dir.path, Some("  ")).expect("clear timezone");
        assert_eq!(read_timezone(&dir.path).expect("read timezone"), None);
    }

    #[test]
    fn unsupported_schema_is_rejected() {
        let dir = TempDir::new();
        fs::write(dir.path.join(APP_JSON), r#"{"schema": 2}"#).expect("write config");
        match load_app_config(&dir.path) {
            Err(InfraError::InvalidConfig(message)) => assert!(message.contains("unsupported schema")),
            other => panic!("expected invalid config error, got {other:?}"),
        }
    }

    #[test]
    fn invalid_window_falls_back_to_default() {
        let dir = TempDir::new();
        fs::write(
            dir.path.join(APP_JSON),
            r#"{"schema": 1, "upcomingWindowDays": 0}"#,
        )
        .expect("write config");
        assert_eq!(read_upcoming_window_days(&dir.path).expect("read window"), 7);
    }
}
