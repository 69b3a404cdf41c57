//! On-disk layout of the Markdown store and atomic file replacement.
//!
//! ```text
//! <root>/metrics/YYYY/MM/YYYY-MM-DD-<type>-<id8>.md
//! <root>/workouts/YYYY/MM/YYYY-MM-DD-<slug>-<id8>.md
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};
use walkdir::WalkDir;

use crate::model::{Metric, Workout};
use crate::persistence::PersistenceError;

pub const METRICS_DIR: &str = "metrics";
pub const WORKOUTS_DIR: &str = "workouts";

const SHORT_ID_LEN: usize = 8;

pub fn metric_path(root: &Path, metric: &Metric) -> PathBuf {
    dated_path(
        &root.join(METRICS_DIR),
        &metric.recorded_at,
        metric.metric_type.as_str(),
        &metric.id,
    )
}

pub fn workout_path(root: &Path, workout: &Workout) -> PathBuf {
    dated_path(
        &root.join(WORKOUTS_DIR),
        &workout.started_at,
        &slugify(&workout.workout_type),
        &workout.id,
    )
}

fn dated_path(base: &Path, at: &DateTime<Utc>, label: &str, id: &str) -> PathBuf {
    base.join(format!("{:04}", at.year()))
        .join(format!("{:02}", at.month()))
        .join(format!("{}-{}-{}.md", at.format("%Y-%m-%d"), label, short_id(id)))
}

fn short_id(id: &str) -> &str {
    id.get(..SHORT_ID_LEN).unwrap_or(id)
}

/// The same file name with the full id instead of its first eight
/// characters. Used when two ids share a short form on the same day.
pub fn full_id_path(path: &Path, id: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = format!("{}.md", short_id(id));
    match name.strip_suffix(&suffix) {
        Some(stem) => path.with_file_name(format!("{stem}{id}.md")),
        None => path.to_path_buf(),
    }
}

/// Whether the file name at `path` was derived from `id`, in either its
/// short or its full-id form.
pub fn is_named_for(path: &Path, id: &str) -> bool {
    let Some(stem) = path.file_stem().map(|s| s.to_string_lossy()) else {
        return false;
    };
    let tail = |suffix: &str| {
        stem.strip_suffix(suffix)
            .is_some_and(|rest| rest.ends_with('-'))
    };
    tail(short_id(id)) || tail(id)
}

/// File-name-safe form of a freeform workout type.
pub fn slugify(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    let mut pending_dash = false;
    for c in raw.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("workout");
    }
    slug
}

/// Every `.md` file under `dir`, sorted by path. A missing directory is empty.
pub fn markdown_files(dir: &Path) -> Result<Vec<PathBuf>, PersistenceError> {
    if !dir.exists() {
        return Ok(vec![]);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| PersistenceError::Io(e.into()))?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if entry.file_type().is_file()
            && !hidden
            && path.extension().and_then(|e| e.to_str()) == Some("md")
        {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

/// Replace `path` with `contents` so readers never observe a partial file.
///
/// The data goes to a hidden temporary file in the same directory, is synced,
/// and is then renamed over the destination.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), PersistenceError> {
    let parent = path.parent().ok_or_else(|| {
        PersistenceError::Validation(format!("{} has no parent directory", path.display()))
    })?;
    let file_name = path.file_name().ok_or_else(|| {
        PersistenceError::Validation(format!("{} has no file name", path.display()))
    })?;
    fs::create_dir_all(parent)?;

    let tmp = parent.join(format!(".{}.tmp", file_name.to_string_lossy()));
    let written = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}
