//! Configuration for the health CLI.
//!
//! Every value has a compile-time default and can be overridden at runtime
//! via a dedicated environment variable.

use std::path::PathBuf;
use std::time::Duration;

/// Default busy timeout for SQLite writers (in milliseconds).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Name of the SQLite file inside the data directory.
const DB_FILE_NAME: &str = "health.db";

/// Name of the Markdown store inside the data directory.
const RECORDS_DIR_NAME: &str = "records";

/// Storage backend selected for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    Sqlite,
    Markdown,
}

impl Backend {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Some(Backend::Sqlite),
            "markdown" | "md" => Some(Backend::Markdown),
            _ => None,
        }
    }
}

/// Get the data directory.
///
/// Priority:
/// 1. `HEALTH_DATA_DIR` env variable if set
/// 2. `$HOME/.config/health`
/// 3. `./data` as fallback
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("HEALTH_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config").join("health");
    }

    PathBuf::from("data")
}

/// Get the storage backend.
///
/// Priority:
/// 1. `HEALTH_BACKEND` env variable if set to `sqlite` or `markdown`
/// 2. SQLite as fallback (also used for unrecognised values)
pub fn get_backend() -> Backend {
    std::env::var("HEALTH_BACKEND")
        .ok()
        .and_then(|raw| Backend::parse(&raw))
        .unwrap_or(Backend::Sqlite)
}

/// Get the SQLite database path.
///
/// Priority:
/// 1. `HEALTH_DB_PATH` env variable if set
/// 2. `<data_dir>/health.db`
pub fn get_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("HEALTH_DB_PATH") {
        return PathBuf::from(path);
    }

    get_data_dir().join(DB_FILE_NAME)
}

/// Get the Markdown store root, `<data_dir>/records`.
pub fn get_records_dir() -> PathBuf {
    get_data_dir().join(RECORDS_DIR_NAME)
}

/// Get the SQLite busy timeout.
///
/// Priority:
/// 1. `HEALTH_BUSY_TIMEOUT_MS` env variable if set (falls back to default
///    if the value cannot be parsed as a `u64`)
/// 2. `5000` ms as fallback
pub fn get_busy_timeout() -> Duration {
    let ms = std::env::var("HEALTH_BUSY_TIMEOUT_MS")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(DEFAULT_BUSY_TIMEOUT_MS);
    Duration::from_millis(ms)
}

/// Get the directory for rolling log files, if file logging is enabled via
/// `HEALTH_LOG_DIR`.
pub fn get_log_dir() -> Option<PathBuf> {
    std::env::var("HEALTH_LOG_DIR").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_data_dir() {
        let dir = get_data_dir();
        match std::env::var("HEALTH_DATA_DIR") {
            Ok(val) => assert_eq!(dir, PathBuf::from(val)),
            Err(_) => assert!(dir.ends_with(".config/health") || dir == PathBuf::from("data")),
        }
    }

    #[test]
    fn test_db_path_and_records_dir_default_under_data_dir() {
        if std::env::var("HEALTH_DB_PATH").is_err() {
            assert_eq!(get_db_path(), get_data_dir().join("health.db"));
        }
        assert_eq!(get_records_dir(), get_data_dir().join("records"));
    }

    #[test]
    fn test_get_busy_timeout_default() {
        if std::env::var("HEALTH_BUSY_TIMEOUT_MS").is_err() {
            assert_eq!(get_busy_timeout(), Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS));
        }
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!(Backend::parse("sqlite"), Some(Backend::Sqlite));
        assert_eq!(Backend::parse(" Markdown "), Some(Backend::Markdown));
        assert_eq!(Backend::parse("md"), Some(Backend::Markdown));
        assert_eq!(Backend::parse("postgres"), None);
    }

    #[test]
    fn test_get_backend() {
        let backend = get_backend();
        match std::env::var("HEALTH_BACKEND").ok().and_then(|v| Backend::parse(&v)) {
            Some(expected) => assert_eq!(backend, expected),
            None => assert_eq!(backend, Backend::Sqlite),
        }
    }
}
