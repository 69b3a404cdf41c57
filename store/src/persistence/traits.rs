//! Async repository trait definitions for the persistence layer.
//!
//! Every caller (CLI handlers, the migration engine, export/import) programs
//! against these traits, and both the SQLite and Markdown backends implement
//! them, so backends are interchangeable via static dispatch.
//!
//! Methods return `impl Future + Send` rather than using `async fn` so that
//! the futures are guaranteed `Send` for callers that spawn them.
//!
//! ## Identifier arguments
//!
//! Methods taking `id_or_prefix` accept a full 36-character id or any shorter
//! prefix of one; see [`super::prefix`] for the resolution rules shared by
//! both backends.
//!
//! ## Limits
//!
//! `limit > 0` caps the result count; zero or negative means unbounded.

use std::future::Future;

use super::{EntityKind, PersistenceError};
use crate::export::ExportBundle;
use crate::model::{Metric, MetricType, Workout, WorkoutMetric};

/// Repository for health metrics.
pub trait MetricRepository: Send + Sync {
    /// Insert a new metric. Fails if the id already exists.
    fn create_metric(
        &self,
        metric: &Metric,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    fn get_metric(
        &self,
        id_or_prefix: &str,
    ) -> impl Future<Output = Result<Metric, PersistenceError>> + Send;
    /// Newest first by `recorded_at`.
    fn list_metrics(
        &self,
        metric_type: Option<MetricType>,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<Metric>, PersistenceError>> + Send;
    fn delete_metric(
        &self,
        id_or_prefix: &str,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;

    /// Most recently recorded metric of the given type.
    fn get_latest_metric(
        &self,
        metric_type: MetricType,
    ) -> impl Future<Output = Result<Metric, PersistenceError>> + Send {
        async move {
            self.list_metrics(Some(metric_type), 1)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| PersistenceError::not_found(EntityKind::Metric, metric_type.as_str()))
        }
    }
}

/// Repository for workouts and the metrics recorded inside them.
///
/// A [`WorkoutMetric`] has no identity outside its workout: deleting a
/// workout removes its metrics, and adding one requires the workout to exist.
pub trait WorkoutRepository: Send + Sync {
    /// Insert a new workout. `workout.metrics` is ignored; metrics are added
    /// through [`WorkoutRepository::add_workout_metric`].
    fn create_workout(
        &self,
        workout: &Workout,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    /// Load a workout with its metrics populated.
    fn get_workout(
        &self,
        id_or_prefix: &str,
    ) -> impl Future<Output = Result<Workout, PersistenceError>> + Send;
    /// Newest first by `started_at`. Metrics are not populated.
    fn list_workouts(
        &self,
        workout_type: Option<&str>,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<Workout>, PersistenceError>> + Send;
    fn delete_workout(
        &self,
        id_or_prefix: &str,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;

    fn add_workout_metric(
        &self,
        metric: &WorkoutMetric,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    fn get_workout_metric(
        &self,
        id_or_prefix: &str,
    ) -> impl Future<Output = Result<WorkoutMetric, PersistenceError>> + Send;
    /// Oldest first. Empty when the workout does not exist.
    fn list_workout_metrics(
        &self,
        workout_id: &str,
    ) -> impl Future<Output = Result<Vec<WorkoutMetric>, PersistenceError>> + Send;
    fn delete_workout_metric(
        &self,
        id_or_prefix: &str,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}

/// The full storage contract: both entity repositories plus bulk
/// export/import and resource release.
pub trait Repository: MetricRepository + WorkoutRepository {
    /// Snapshot of everything stored, workouts with their metrics.
    fn get_all_data(&self) -> impl Future<Output = Result<ExportBundle, PersistenceError>> + Send {
        async move {
            let metrics = self.list_metrics(None, 0).await?;
            let summaries = self.list_workouts(None, 0).await?;
            let mut workouts = Vec::with_capacity(summaries.len());
            for summary in &summaries {
                workouts.push(self.get_workout(&summary.id).await?);
            }
            Ok(ExportBundle::new(metrics, workouts))
        }
    }

    /// Insert every entity of `bundle`, preserving ids and timestamps.
    ///
    /// Stops at the first failure; entities written before it stay written.
    fn import_data(
        &self,
        bundle: &ExportBundle,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send {
        async move {
            for metric in &bundle.metrics {
                self.create_metric(metric).await?;
            }
            for workout in &bundle.workouts {
                self.create_workout(&workout.without_metrics()).await?;
                for metric in &workout.metrics {
                    self.add_workout_metric(metric).await?;
                }
            }
            Ok(())
        }
    }

    fn close(&self) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}
