//! SQLite-backed [`WorkoutRepository`].
//!
//! Workout metrics live in `workout_metrics`, whose `workout_id` references
//! `workouts(id) ON DELETE CASCADE`. Deleting a workout is a single statement;
//! the cascade removes its metrics.

use super::helpers::{
    decode_all, exists, push_limit, resolve_id, WorkoutMetricRow, WorkoutRow,
    WORKOUT_COLUMNS, WORKOUT_METRIC_COLUMNS,
};
use super::SqliteRepository;
use crate::model::{stored_notes, Workout, WorkoutMetric};
use crate::persistence::traits::WorkoutRepository;
use crate::persistence::{EntityKind, PersistenceError};
use crate::timestamp;

impl WorkoutRepository for SqliteRepository {
    async fn create_workout(&self, workout: &Workout) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO workouts
                (id, workout_type, started_at, duration_minutes, notes, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&workout.id)
        .bind(&workout.workout_type)
        .bind(timestamp::format_sortable(&workout.started_at))
        .bind(workout.duration_minutes)
        .bind(stored_notes(workout.notes.as_deref()))
        .bind(timestamp::format_sortable(&workout.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_workout(&self, id_or_prefix: &str) -> Result<Workout, PersistenceError> {
        let id = resolve_id(&self.pool, EntityKind::Workout, id_or_prefix).await?;
        let row: Option<WorkoutRow> =
            sqlx::query_as(&format!("SELECT {WORKOUT_COLUMNS} FROM workouts WHERE id = ?"))
                .bind(&id)
                .fetch_optional(&self.pool)
                .await?;

        let mut workout: Workout = row
            .ok_or_else(|| PersistenceError::not_found(EntityKind::Workout, id.as_str()))?
            .try_into()?;
        workout.metrics = self.list_workout_metrics(&id).await?;
        Ok(workout)
    }

    async fn list_workouts(
        &self,
        workout_type: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Workout>, PersistenceError> {
        let mut sql = format!("SELECT {WORKOUT_COLUMNS} FROM workouts");
        if workout_type.is_some() {
            sql.push_str(" WHERE workout_type = ?");
        }
        sql.push_str(" ORDER BY started_at DESC, id DESC");
        push_limit(&mut sql, limit);

        let mut query = sqlx::query_as::<sqlx::Sqlite, WorkoutRow>(&sql);
        if let Some(workout_type) = workout_type {
            query = query.bind(workout_type);
        }
        if limit > 0 {
            query = query.bind(limit);
        }

        decode_all(query.fetch_all(&self.pool).await?)
    }

    async fn delete_workout(&self, id_or_prefix: &str) -> Result<(), PersistenceError> {
        let id = resolve_id(&self.pool, EntityKind::Workout, id_or_prefix).await?;
        sqlx::query("DELETE FROM workouts WHERE id = ?")
            .bind(&id)
            .execute(&self.pool)
            .await?;

        tracing::debug!(%id, "Deleted workout");
        Ok(())
    }

    async fn add_workout_metric(&self, metric: &WorkoutMetric) -> Result<(), PersistenceError> {
        if !exists(&self.pool, EntityKind::Workout, &metric.workout_id).await? {
            return Err(PersistenceError::not_found(
                EntityKind::Workout,
                metric.workout_id.as_str(),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO workout_metrics
                (id, workout_id, metric_name, value, unit, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&metric.id)
        .bind(&metric.workout_id)
        .bind(&metric.metric_name)
        .bind(metric.value)
        .bind(&metric.unit)
        .bind(timestamp::format_sortable(&metric.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_workout_metric(&self, id_or_prefix: &str) -> Result<WorkoutMetric, PersistenceError> {
        let id = resolve_id(&self.pool, EntityKind::WorkoutMetric, id_or_prefix).await?;
        let row: Option<WorkoutMetricRow> = sqlx::query_as(&format!(
            "SELECT {WORKOUT_METRIC_COLUMNS} FROM workout_metrics WHERE id = ?"
        ))
        .bind(&id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| PersistenceError::not_found(EntityKind::WorkoutMetric, id))?
            .try_into()
    }

    async fn list_workout_metrics(
        &self,
        workout_id: &str,
    ) -> Result<Vec<WorkoutMetric>, PersistenceError> {
        let rows: Vec<WorkoutMetricRow> = sqlx::query_as(&format!(
            "SELECT {WORKOUT_METRIC_COLUMNS} FROM workout_metrics \
             WHERE workout_id = ? ORDER BY created_at, id"
        ))
        .bind(workout_id)
        .fetch_all(&self.pool)
        .await?;

        decode_all(rows)
    }

    async fn delete_workout_metric(&self, id_or_prefix: &str) -> Result<(), PersistenceError> {
        let id = resolve_id(&self.pool, EntityKind::WorkoutMetric, id_or_prefix).await?;
        sqlx::query("DELETE FROM workout_metrics WHERE id = ?")
            .bind(&id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
