//! Idempotent application of change records to the SQLite store.
//!
//! Every upsert is a single `INSERT … ON CONFLICT(id) DO UPDATE`, so replaying
//! a change any number of times leaves the same row. A workout metric that
//! arrives before its workout is parked in `pending_workout_metrics` (keyed by
//! metric id) and replayed inside the transaction that writes the workout.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use super::change::{
    Change, DeletePayload, MetricPayload, Operation, SyncEntity, WorkoutMetricPayload,
    WorkoutPayload,
};
use super::{SyncError, SyncReport};
use crate::model::{stored_notes, Metric, Workout, WorkoutMetric};
use crate::timestamp;

/// What [`ChangeApplier::apply`] did with a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Applied,
    /// Parked until the parent workout arrives.
    Deferred,
    /// Unknown entity tag or operation.
    Ignored,
}

#[derive(Clone)]
pub struct ChangeApplier {
    pool: SqlitePool,
}

impl ChangeApplier {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn apply(&self, change: &Change) -> Result<Applied, SyncError> {
        let Some(entity) = SyncEntity::from_tag(&change.entity) else {
            debug!(entity = %change.entity, "Ignoring change for unknown entity");
            return Ok(Applied::Ignored);
        };

        if change.operation == Operation::Unknown {
            debug!(%entity, "Ignoring change with unknown operation");
            return Ok(Applied::Ignored);
        }

        let outcome = match (entity, change.operation) {
            (SyncEntity::Metric, Operation::Upsert) => {
                let metric = Metric::try_from(change.decode::<MetricPayload>()?)?;
                self.upsert_metric(&metric).await?
            }
            (SyncEntity::Workout, Operation::Upsert) => {
                let workout = Workout::try_from(change.decode::<WorkoutPayload>()?)?;
                self.upsert_workout(&workout).await?
            }
            (SyncEntity::WorkoutMetric, Operation::Upsert) => {
                let payload = change.decode::<WorkoutMetricPayload>()?;
                let metric = WorkoutMetric::try_from(payload)?;
                self.upsert_workout_metric(&metric).await?
            }
            (entity, Operation::Delete) => {
                let DeletePayload { id } = change.decode()?;
                if id.trim().is_empty() {
                    return Err(SyncError::malformed(entity.as_str(), "empty id"));
                }
                self.delete(entity, &id).await?
            }
            (_, Operation::Unknown) => Applied::Ignored,
        };

        debug!(%entity, operation = ?change.operation, ?outcome, "Applied change");
        Ok(outcome)
    }

    /// Apply changes in order. Malformed changes are logged and dropped; the
    /// first storage failure stops the batch.
    pub async fn apply_batch(&self, changes: &[Change]) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();
        for change in changes {
            match self.apply(change).await {
                Ok(Applied::Applied) => report.applied += 1,
                Ok(Applied::Deferred) => report.deferred += 1,
                Ok(Applied::Ignored) => report.ignored += 1,
                Err(SyncError::MalformedPayload { entity, reason }) => {
                    warn!(%entity, %reason, "Dropping malformed change");
                    report.dropped += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    /// Number of workout metrics waiting for their workout.
    pub async fn pending_count(&self) -> Result<u64, SyncError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pending_workout_metrics")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    /// Drop pending rows received more than `older_than` ago. Returns how many
    /// were removed. An age reaching before the representable range expires
    /// nothing.
    pub async fn expire_pending(&self, older_than: chrono::Duration) -> Result<u64, SyncError> {
        let Some(cutoff) = Utc::now().checked_sub_signed(older_than) else {
            return Ok(0);
        };
        let cutoff = timestamp::format_sortable(&cutoff);
        let result = sqlx::query("DELETE FROM pending_workout_metrics WHERE received_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            warn!(removed, "Expired pending workout metrics");
        }
        Ok(removed)
    }

    async fn upsert_metric(&self, metric: &Metric) -> Result<Applied, SyncError> {
        let mut conn = self.pool.acquire().await?;
        upsert_metric_row(&mut conn, metric).await?;
        Ok(Applied::Applied)
    }

    async fn upsert_workout(&self, workout: &Workout) -> Result<Applied, SyncError> {
        let mut tx = self.pool.begin().await?;
        upsert_workout_row(&mut tx, workout).await?;

        let pending: Vec<(String, String)> = sqlx::query_as(
            "SELECT id, payload FROM pending_workout_metrics \
             WHERE workout_id = ? ORDER BY received_at, id",
        )
        .bind(&workout.id)
        .fetch_all(&mut *tx)
        .await?;

        for (id, payload) in &pending {
            let payload: WorkoutMetricPayload = serde_json::from_str(payload)?;
            let metric = WorkoutMetric::try_from(payload)?;
            upsert_workout_metric_row(&mut tx, &metric).await?;
            sqlx::query("DELETE FROM pending_workout_metrics WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        if !pending.is_empty() {
            debug!(workout_id = %workout.id, replayed = pending.len(), "Replayed pending workout metrics");
        }
        Ok(Applied::Applied)
    }

    async fn upsert_workout_metric(&self, metric: &WorkoutMetric) -> Result<Applied, SyncError> {
        let mut tx = self.pool.begin().await?;
        let parent: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM workouts WHERE id = ?")
            .bind(&metric.workout_id)
            .fetch_optional(&mut *tx)
            .await?;

        let outcome = if parent.is_some() {
            upsert_workout_metric_row(&mut tx, metric).await?;
            sqlx::query("DELETE FROM pending_workout_metrics WHERE id = ?")
                .bind(&metric.id)
                .execute(&mut *tx)
                .await?;
            Applied::Applied
        } else {
            // A metric moved to a workout that has not arrived leaves its old one.
            sqlx::query("DELETE FROM workout_metrics WHERE id = ?")
                .bind(&metric.id)
                .execute(&mut *tx)
                .await?;
            let payload = serde_json::to_string(&WorkoutMetricPayload::from(metric))?;
            sqlx::query(
                r#"
                INSERT INTO pending_workout_metrics (id, workout_id, payload, received_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    workout_id = excluded.workout_id,
                    payload = excluded.payload,
                    received_at = excluded.received_at
                "#,
            )
            .bind(&metric.id)
            .bind(&metric.workout_id)
            .bind(payload)
            .bind(timestamp::format_sortable(&Utc::now()))
            .execute(&mut *tx)
            .await?;
            Applied::Deferred
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn delete(&self, entity: SyncEntity, id: &str) -> Result<Applied, SyncError> {
        let mut tx = self.pool.begin().await?;
        match entity {
            SyncEntity::Metric => {
                sqlx::query("DELETE FROM metrics WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            }
            SyncEntity::Workout => {
                sqlx::query("DELETE FROM workout_metrics WHERE workout_id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM workouts WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM pending_workout_metrics WHERE workout_id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            }
            SyncEntity::WorkoutMetric => {
                sqlx::query("DELETE FROM workout_metrics WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM pending_workout_metrics WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;
        Ok(Applied::Applied)
    }
}

async fn upsert_metric_row(conn: &mut SqliteConnection, m: &Metric) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO metrics (id, metric_type, value, unit, recorded_at, notes, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            metric_type = excluded.metric_type,
            value = excluded.value,
            unit = excluded.unit,
            recorded_at = excluded.recorded_at,
            notes = excluded.notes,
            created_at = excluded.created_at
        "#,
    )
    .bind(&m.id)
    .bind(m.metric_type.as_str())
    .bind(m.value)
    .bind(&m.unit)
    .bind(timestamp::format_sortable(&m.recorded_at))
    .bind(stored_notes(m.notes.as_deref()))
    .bind(timestamp::format_sortable(&m.created_at))
    .execute(conn)
    .await?;
    Ok(())
}

async fn upsert_workout_row(conn: &mut SqliteConnection, w: &Workout) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO workouts (id, workout_type, started_at, duration_minutes, notes, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            workout_type = excluded.workout_type,
            started_at = excluded.started_at,
            duration_minutes = excluded.duration_minutes,
            notes = excluded.notes,
            created_at = excluded.created_at
        "#,
    )
    .bind(&w.id)
    .bind(&w.workout_type)
    .bind(timestamp::format_sortable(&w.started_at))
    .bind(w.duration_minutes)
    .bind(stored_notes(w.notes.as_deref()))
    .bind(timestamp::format_sortable(&w.created_at))
    .execute(conn)
    .await?;
    Ok(())
}

async fn upsert_workout_metric_row(
    conn: &mut SqliteConnection,
    m: &WorkoutMetric,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO workout_metrics (id, workout_id, metric_name, value, unit, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            workout_id = excluded.workout_id,
            metric_name = excluded.metric_name,
            value = excluded.value,
            unit = excluded.unit,
            created_at = excluded.created_at
        "#,
    )
    .bind(&m.id)
    .bind(&m.workout_id)
    .bind(&m.metric_name)
    .bind(m.value)
    .bind(&m.unit)
    .bind(timestamp::format_sortable(&m.created_at))
    .execute(conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MetricType;
    use crate::persistence::sqlite::Database;
    use crate::persistence::{MetricRepository, SqliteRepository, WorkoutRepository};
    use serde_json::json;

    async fn setup() -> (Database, ChangeApplier, SqliteRepository) {
        let db = Database::new_in_memory().await.unwrap();
        let applier = ChangeApplier::new(db.pool().clone());
        let repo = SqliteRepository::new(db.pool().clone());
        (db, applier, repo)
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_and_updates() {
        let (_db, applier, repo) = setup().await;
        let mut metric = Metric::new(MetricType::Weight, 82.5, None, None);

        let change = Change::upsert_metric(&metric).unwrap();
        assert_eq!(applier.apply(&change).await.unwrap(), Applied::Applied);
        assert_eq!(applier.apply(&change).await.unwrap(), Applied::Applied);
        assert_eq!(repo.list_metrics(None, 0).await.unwrap(), vec![metric.clone()]);

        metric.value = 81.9;
        applier.apply(&Change::upsert_metric(&metric).unwrap()).await.unwrap();
        assert_eq!(repo.get_metric(&metric.id).await.unwrap().value, 81.9);
    }

    #[tokio::test]
    async fn test_out_of_order_metric_waits_for_workout() {
        let (_db, applier, repo) = setup().await;
        let workout = Workout::new("run", None, Some(45), None);
        let distance = WorkoutMetric::new(&workout.id, "distance", 5.2, Some("km".into()));

        let early = Change::upsert_workout_metric(&distance).unwrap();
        assert_eq!(applier.apply(&early).await.unwrap(), Applied::Deferred);
        // Redelivery replaces the parked copy.
        assert_eq!(applier.apply(&early).await.unwrap(), Applied::Deferred);
        assert_eq!(applier.pending_count().await.unwrap(), 1);
        assert!(repo.list_workout_metrics(&workout.id).await.unwrap().is_empty());

        let parent = Change::upsert_workout(&workout).unwrap();
        assert_eq!(applier.apply(&parent).await.unwrap(), Applied::Applied);

        assert_eq!(applier.pending_count().await.unwrap(), 0);
        assert_eq!(repo.get_workout(&workout.id).await.unwrap().metrics, vec![distance]);
    }

    #[tokio::test]
    async fn test_in_order_metric_applies_directly() {
        let (_db, applier, repo) = setup().await;
        let workout = Workout::new("swim", None, None, None);
        let laps = WorkoutMetric::new(&workout.id, "laps", 40.0, None);

        applier.apply(&Change::upsert_workout(&workout).unwrap()).await.unwrap();
        let change = Change::upsert_workout_metric(&laps).unwrap();
        assert_eq!(applier.apply(&change).await.unwrap(), Applied::Applied);
        assert_eq!(applier.apply(&change).await.unwrap(), Applied::Applied);

        assert_eq!(repo.list_workout_metrics(&workout.id).await.unwrap(), vec![laps]);
        assert_eq!(applier.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_workout_upsert_is_idempotent_and_updates() {
        let (_db, applier, repo) = setup().await;
        let mut workout = Workout::new("run", None, Some(30), None);
        let distance = WorkoutMetric::new(&workout.id, "distance", 5.0, Some("km".into()));
        applier.apply(&Change::upsert_workout(&workout).unwrap()).await.unwrap();
        applier.apply(&Change::upsert_workout_metric(&distance).unwrap()).await.unwrap();

        workout.duration_minutes = Some(42);
        workout.notes = Some("negative split".into());
        let change = Change::upsert_workout(&workout).unwrap();
        assert_eq!(applier.apply(&change).await.unwrap(), Applied::Applied);
        assert_eq!(applier.apply(&change).await.unwrap(), Applied::Applied);

        let stored = repo.list_workouts(None, 0).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].duration_minutes, Some(42));
        assert_eq!(stored[0].notes.as_deref(), Some("negative split"));
        assert_eq!(repo.get_workout(&workout.id).await.unwrap().metrics, vec![distance]);
    }

    #[tokio::test]
    async fn test_metric_moved_to_missing_workout_leaves_old_one() {
        let (_db, applier, repo) = setup().await;
        let first = Workout::new("run", None, None, None);
        let second = Workout::new("run", None, None, None);
        let mut distance = WorkoutMetric::new(&first.id, "distance", 5.0, None);
        applier.apply(&Change::upsert_workout(&first).unwrap()).await.unwrap();
        applier.apply(&Change::upsert_workout_metric(&distance).unwrap()).await.unwrap();

        distance.workout_id = second.id.clone();
        let moved = Change::upsert_workout_metric(&distance).unwrap();
        assert_eq!(applier.apply(&moved).await.unwrap(), Applied::Deferred);
        assert!(repo.list_workout_metrics(&first.id).await.unwrap().is_empty());

        applier.apply(&Change::upsert_workout(&second).unwrap()).await.unwrap();
        assert_eq!(repo.list_workout_metrics(&second.id).await.unwrap(), vec![distance]);
        assert_eq!(applier.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_blank_notes_are_stored_as_none() {
        let (_db, applier, repo) = setup().await;
        let mut metric = Metric::new(MetricType::Weight, 82.5, None, None);
        metric.notes = Some(String::new());
        applier.apply(&Change::upsert_metric(&metric).unwrap()).await.unwrap();
        assert_eq!(repo.get_metric(&metric.id).await.unwrap().notes, None);
    }

    #[tokio::test]
    async fn test_batch_drops_malformed_and_ignores_unknown() {
        let (_db, applier, repo) = setup().await;
        let metric = Metric::new(MetricType::Steps, 12000.0, None, None);
        let changes = vec![
            Change {
                entity: "metric".into(),
                operation: Operation::Upsert,
                payload: json!({"id": "broken"}),
            },
            Change {
                entity: "sleep_stage".into(),
                operation: Operation::Upsert,
                payload: json!({}),
            },
            Change::upsert_metric(&metric).unwrap(),
        ];

        let report = applier.apply_batch(&changes).await.unwrap();
        assert_eq!(
            report,
            SyncReport {
                applied: 1,
                ignored: 1,
                dropped: 1,
                ..SyncReport::default()
            }
        );
        assert_eq!(repo.list_metrics(None, 0).await.unwrap(), vec![metric]);
    }

    #[tokio::test]
    async fn test_apply_surfaces_malformed_payload() {
        let (_db, applier, _repo) = setup().await;
        let change = Change {
            entity: "workout".into(),
            operation: Operation::Delete,
            payload: json!({"id": ""}),
        };
        assert!(matches!(
            applier.apply(&change).await,
            Err(SyncError::MalformedPayload { .. })
        ));
    }

    #[tokio::test]
    async fn test_workout_delete_removes_metrics_and_pending() {
        let (_db, applier, repo) = setup().await;
        let workout = Workout::new("bike", None, None, None);
        applier.apply(&Change::upsert_workout(&workout).unwrap()).await.unwrap();
        for name in ["distance", "cadence"] {
            let m = WorkoutMetric::new(&workout.id, name, 1.0, None);
            applier.apply(&Change::upsert_workout_metric(&m).unwrap()).await.unwrap();
        }

        let delete = Change::delete(SyncEntity::Workout, &workout.id).unwrap();
        assert_eq!(applier.apply(&delete).await.unwrap(), Applied::Applied);
        assert!(repo.list_workouts(None, 0).await.unwrap().is_empty());
        assert!(repo.list_workout_metrics(&workout.id).await.unwrap().is_empty());

        // A late metric for the deleted workout is parked, and a repeated
        // delete clears it.
        let late = WorkoutMetric::new(&workout.id, "power", 210.0, Some("W".into()));
        applier.apply(&Change::upsert_workout_metric(&late).unwrap()).await.unwrap();
        assert_eq!(applier.pending_count().await.unwrap(), 1);
        applier.apply(&delete).await.unwrap();
        assert_eq!(applier.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_workout_metric_delete_clears_pending_copy() {
        let (_db, applier, _repo) = setup().await;
        let orphan = WorkoutMetric::new(crate::model::new_id(), "distance", 3.0, None);
        applier.apply(&Change::upsert_workout_metric(&orphan).unwrap()).await.unwrap();
        assert_eq!(applier.pending_count().await.unwrap(), 1);

        applier
            .apply(&Change::delete(SyncEntity::WorkoutMetric, &orphan.id).unwrap())
            .await
            .unwrap();
        assert_eq!(applier.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expire_pending_only_removes_old_rows() {
        let (db, applier, _repo) = setup().await;
        let stale = WorkoutMetric::new(crate::model::new_id(), "distance", 3.0, None);
        let fresh = WorkoutMetric::new(crate::model::new_id(), "distance", 4.0, None);
        for m in [&stale, &fresh] {
            applier.apply(&Change::upsert_workout_metric(m).unwrap()).await.unwrap();
        }
        sqlx::query("UPDATE pending_workout_metrics SET received_at = ? WHERE id = ?")
            .bind("2020-01-01T00:00:00.000000000Z")
            .bind(&stale.id)
            .execute(db.pool())
            .await
            .unwrap();

        assert_eq!(applier.expire_pending(chrono::Duration::days(7)).await.unwrap(), 1);
        assert_eq!(applier.pending_count().await.unwrap(), 1);
        assert_eq!(applier.expire_pending(chrono::Duration::days(7)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expire_pending_with_huge_age_removes_nothing() {
        let (_db, applier, _repo) = setup().await;
        let orphan = WorkoutMetric::new(crate::model::new_id(), "distance", 3.0, None);
        applier.apply(&Change::upsert_workout_metric(&orphan).unwrap()).await.unwrap();

        let huge = chrono::Duration::days(1_000_000_000);
        assert_eq!(applier.expire_pending(huge).await.unwrap(), 0);
        assert_eq!(applier.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_metric_delete_is_idempotent() {
        let (_db, applier, repo) = setup().await;
        let metric = Metric::new(MetricType::Mood, 7.0, None, None);
        applier.apply(&Change::upsert_metric(&metric).unwrap()).await.unwrap();

        let delete = Change::delete(SyncEntity::Metric, &metric.id).unwrap();
        applier.apply(&delete).await.unwrap();
        applier.apply(&delete).await.unwrap();
        assert!(repo.get_metric(&metric.id).await.unwrap_err().is_not_found());
    }
}
