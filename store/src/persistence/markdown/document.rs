//! Front-matter documents: a YAML header between `---` lines, then the notes.
//!
//! ```text
//! ---
//! id: 3f2c…
//! type: weight
//! ---
//!
//! notes, verbatim
//! ```

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::model::{stored_notes, Metric, MetricType, Workout, WorkoutMetric};
use crate::persistence::PersistenceError;
use crate::timestamp;

const DELIMITER: &str = "---\n";
const CLOSING: &str = "\n---\n";
const CLOSING_AT_EOF: &str = "\n---";

/// Render a header and optional notes body.
pub fn render<T: Serialize>(header: &T, notes: Option<&str>) -> Result<String, PersistenceError> {
    let yaml = serde_yaml::to_string(header)?;
    let body = notes.unwrap_or_default();
    let mut out = String::with_capacity(yaml.len() + body.len() + 16);
    out.push_str(DELIMITER);
    out.push_str(&yaml);
    if !yaml.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(body);
    Ok(out)
}

/// Split a document into its parsed header and notes. Empty notes are `None`.
pub fn parse<T: DeserializeOwned>(
    path: &Path,
    content: &str,
) -> Result<(T, Option<String>), PersistenceError> {
    let malformed = |what: &str| {
        PersistenceError::Validation(format!("{}: {what}", path.display()))
    };

    let rest = content
        .strip_prefix(DELIMITER)
        .ok_or_else(|| malformed("missing opening front-matter delimiter"))?;
    let (yaml, body) = match rest.find(CLOSING) {
        Some(at) => (&rest[..at], &rest[at + CLOSING.len()..]),
        None => rest
            .strip_suffix(CLOSING_AT_EOF)
            .map(|yaml| (yaml, ""))
            .ok_or_else(|| malformed("missing closing front-matter delimiter"))?,
    };

    let header: T = serde_yaml::from_str(yaml)
        .map_err(|e| malformed(&format!("invalid front-matter: {e}")))?;

    let body = body.strip_prefix('\n').unwrap_or(body);
    let notes = (!body.trim().is_empty()).then(|| body.to_string());

    Ok((header, notes))
}

// ── Headers ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct MetricHeader {
    pub id: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub value: f64,
    pub unit: String,
    #[serde(with = "timestamp")]
    pub recorded_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl MetricHeader {
    pub fn from_metric(metric: &Metric) -> Self {
        Self {
            id: metric.id.clone(),
            metric_type: metric.metric_type,
            value: metric.value,
            unit: metric.unit.clone(),
            recorded_at: metric.recorded_at,
            created_at: metric.created_at,
        }
    }

    pub fn into_metric(self, notes: Option<String>) -> Metric {
        Metric {
            id: self.id,
            metric_type: self.metric_type,
            value: self.value,
            unit: self.unit,
            recorded_at: self.recorded_at,
            notes,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkoutHeader {
    pub id: String,
    #[serde(rename = "type")]
    pub workout_type: String,
    #[serde(with = "timestamp")]
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i64>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metrics: Vec<EmbeddedMetric>,
}

/// A workout metric as stored inside its workout's file. The owning
/// workout id is implied by the file.
#[derive(Debug, Serialize, Deserialize)]
pub struct EmbeddedMetric {
    pub id: String,
    pub name: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl WorkoutHeader {
    pub fn from_workout(workout: &Workout) -> Self {
        Self {
            id: workout.id.clone(),
            workout_type: workout.workout_type.clone(),
            started_at: workout.started_at,
            duration_minutes: workout.duration_minutes,
            created_at: workout.created_at,
            metrics: workout
                .metrics
                .iter()
                .map(|m| EmbeddedMetric {
                    id: m.id.clone(),
                    name: m.metric_name.clone(),
                    value: m.value,
                    unit: m.unit.clone(),
                    created_at: m.created_at,
                })
                .collect(),
        }
    }

    pub fn into_workout(self, notes: Option<String>) -> Workout {
        let workout_id = self.id;
        let metrics = self
            .metrics
            .into_iter()
            .map(|m| WorkoutMetric {
                id: m.id,
                workout_id: workout_id.clone(),
                metric_name: m.name,
                value: m.value,
                unit: m.unit,
                created_at: m.created_at,
            })
            .collect();

        Workout {
            id: workout_id,
            workout_type: self.workout_type,
            started_at: self.started_at,
            duration_minutes: self.duration_minutes,
            notes,
            created_at: self.created_at,
            metrics,
        }
    }
}

pub fn render_metric(metric: &Metric) -> Result<String, PersistenceError> {
    render(&MetricHeader::from_metric(metric), stored_notes(metric.notes.as_deref()))
}

pub fn parse_metric(path: &Path, content: &str) -> Result<Metric, PersistenceError> {
    let (header, notes): (MetricHeader, _) = parse(path, content)?;
    Ok(header.into_metric(notes))
}

pub fn render_workout(workout: &Workout) -> Result<String, PersistenceError> {
    render(&WorkoutHeader::from_workout(workout), stored_notes(workout.notes.as_deref()))
}

pub fn parse_workout(path: &Path, content: &str) -> Result<Workout, PersistenceError> {
    let (header, notes): (WorkoutHeader, _) = parse(path, content)?;
    Ok(header.into_workout(notes))
}
