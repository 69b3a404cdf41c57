//! Shared row types and decode helpers for SQLite ↔ domain conversions.
//!
//! Text columns holding timestamps and metric types are parsed strictly: a
//! malformed value surfaces as [`PersistenceError::Validation`] instead of
//! being coerced.

use sqlx::SqlitePool;

use crate::model::{Metric, Workout, WorkoutMetric};
use crate::persistence::prefix::{classify_matches, like_pattern, Lookup};
use crate::persistence::{EntityKind, PersistenceError};
use crate::timestamp;

pub const METRIC_COLUMNS: &str = "id, metric_type, value, unit, recorded_at, notes, created_at";
pub const WORKOUT_COLUMNS: &str =
    "id, workout_type, started_at, duration_minutes, notes, created_at";
pub const WORKOUT_METRIC_COLUMNS: &str = "id, workout_id, metric_name, value, unit, created_at";

// ── Rows ───────────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
pub struct MetricRow {
    id: String,
    metric_type: String,
    value: f64,
    unit: String,
    recorded_at: String,
    notes: Option<String>,
    created_at: String,
}

impl TryFrom<MetricRow> for Metric {
    type Error = PersistenceError;

    fn try_from(row: MetricRow) -> Result<Self, Self::Error> {
        Ok(Metric {
            metric_type: row.metric_type.parse()?,
            recorded_at: timestamp::parse(&row.recorded_at)?,
            created_at: timestamp::parse(&row.created_at)?,
            id: row.id,
            value: row.value,
            unit: row.unit,
            notes: row.notes,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct WorkoutRow {
    id: String,
    workout_type: String,
    started_at: String,
    duration_minutes: Option<i64>,
    notes: Option<String>,
    created_at: String,
}

impl TryFrom<WorkoutRow> for Workout {
    type Error = PersistenceError;

    fn try_from(row: WorkoutRow) -> Result<Self, Self::Error> {
        Ok(Workout {
            started_at: timestamp::parse(&row.started_at)?,
            created_at: timestamp::parse(&row.created_at)?,
            id: row.id,
            workout_type: row.workout_type,
            duration_minutes: row.duration_minutes,
            notes: row.notes,
            metrics: Vec::new(),
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct WorkoutMetricRow {
    id: String,
    workout_id: String,
    metric_name: String,
    value: f64,
    unit: Option<String>,
    created_at: String,
}

impl TryFrom<WorkoutMetricRow> for WorkoutMetric {
    type Error = PersistenceError;

    fn try_from(row: WorkoutMetricRow) -> Result<Self, Self::Error> {
        Ok(WorkoutMetric {
            created_at: timestamp::parse(&row.created_at)?,
            id: row.id,
            workout_id: row.workout_id,
            metric_name: row.metric_name,
            value: row.value,
            unit: row.unit,
        })
    }
}

/// Decode every row, failing on the first malformed one.
pub fn decode_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, PersistenceError>
where
    T: TryFrom<R, Error = PersistenceError>,
{
    rows.into_iter().map(T::try_from).collect()
}

// ── Identifier resolution ──────────────────────────────────────────────

fn table_for(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Metric => "metrics",
        EntityKind::Workout => "workouts",
        EntityKind::WorkoutMetric => "workout_metrics",
    }
}

/// Resolve a full id or prefix to exactly one stored id.
pub async fn resolve_id(
    pool: &SqlitePool,
    kind: EntityKind,
    id_or_prefix: &str,
) -> Result<String, PersistenceError> {
    let table = table_for(kind);
    match Lookup::parse(kind, id_or_prefix)? {
        Lookup::Exact(id) => {
            let found: Option<(String,)> =
                sqlx::query_as(&format!("SELECT id FROM {table} WHERE id = ?"))
                    .bind(id)
                    .fetch_optional(pool)
                    .await?;
            found
                .map(|(id,)| id)
                .ok_or_else(|| PersistenceError::not_found(kind, id))
        }
        Lookup::Prefix(prefix) => {
            let rows: Vec<(String,)> = sqlx::query_as(&format!(
                "SELECT id FROM {table} WHERE id LIKE ? ESCAPE '\\'"
            ))
            .bind(like_pattern(prefix))
            .fetch_all(pool)
            .await?;
            classify_matches(kind, prefix, rows.into_iter().map(|(id,)| id))
        }
    }
}

/// Whether a row with exactly this id exists.
pub async fn exists(pool: &SqlitePool, kind: EntityKind, id: &str) -> Result<bool, PersistenceError> {
    let table = table_for(kind);
    let row: Option<(i64,)> = sqlx::query_as(&format!("SELECT 1 FROM {table} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// Append ` LIMIT ?` when the caller asked for a positive limit.
pub fn push_limit(sql: &mut String, limit: i64) {
    if limit > 0 {
        sql.push_str(" LIMIT ?");
    }
}
