//! SQLite-backed [`MetricRepository`].

use super::helpers::{decode_all, push_limit, resolve_id, MetricRow, METRIC_COLUMNS};
use super::SqliteRepository;
use crate::model::{stored_notes, Metric, MetricType};
use crate::persistence::traits::MetricRepository;
use crate::persistence::{EntityKind, PersistenceError};
use crate::timestamp;

impl MetricRepository for SqliteRepository {
    async fn create_metric(&self, metric: &Metric) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO metrics
                (id, metric_type, value, unit, recorded_at, notes, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&metric.id)
        .bind(metric.metric_type.as_str())
        .bind(metric.value)
        .bind(&metric.unit)
        .bind(timestamp::format_sortable(&metric.recorded_at))
        .bind(stored_notes(metric.notes.as_deref()))
        .bind(timestamp::format_sortable(&metric.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_metric(&self, id_or_prefix: &str) -> Result<Metric, PersistenceError> {
        let id = resolve_id(&self.pool, EntityKind::Metric, id_or_prefix).await?;
        let row: Option<MetricRow> =
            sqlx::query_as(&format!("SELECT {METRIC_COLUMNS} FROM metrics WHERE id = ?"))
                .bind(&id)
                .fetch_optional(&self.pool)
                .await?;

        row.ok_or_else(|| PersistenceError::not_found(EntityKind::Metric, id))?
            .try_into()
    }

    async fn list_metrics(
        &self,
        metric_type: Option<MetricType>,
        limit: i64,
    ) -> Result<Vec<Metric>, PersistenceError> {
        let mut sql = format!("SELECT {METRIC_COLUMNS} FROM metrics");
        if metric_type.is_some() {
            sql.push_str(" WHERE metric_type = ?");
        }
        sql.push_str(" ORDER BY recorded_at DESC, id DESC");
        push_limit(&mut sql, limit);

        let mut query = sqlx::query_as::<sqlx::Sqlite, MetricRow>(&sql);
        if let Some(metric_type) = metric_type {
            query = query.bind(metric_type.as_str());
        }
        if limit > 0 {
            query = query.bind(limit);
        }

        decode_all(query.fetch_all(&self.pool).await?)
    }

    async fn delete_metric(&self, id_or_prefix: &str) -> Result<(), PersistenceError> {
        let id = resolve_id(&self.pool, EntityKind::Metric, id_or_prefix).await?;
        sqlx::query("DELETE FROM metrics WHERE id = ?")
            .bind(&id)
            .execute(&self.pool)
            .await?;

        tracing::debug!(%id, "Deleted metric");
        Ok(())
    }
}
