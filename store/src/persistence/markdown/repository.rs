use std::fs;
use std::path::{Path, PathBuf};

use super::document::{parse_metric, parse_workout, render_metric, render_workout};
use super::layout::{self, METRICS_DIR, WORKOUTS_DIR};
use crate::export::ExportBundle;
use crate::model::{Metric, MetricType, Workout, WorkoutMetric};
use crate::persistence::prefix::{classify_matches, Lookup};
use crate::persistence::traits::{MetricRepository, Repository, WorkoutRepository};
use crate::persistence::{EntityKind, PersistenceError};

/// File-per-entity repository rooted at a directory.
#[derive(Debug, Clone)]
pub struct MarkdownRepository {
    root: PathBuf,
}

impl MarkdownRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        tracing::debug!(root = %root.display(), "Opened markdown store");
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn load_metrics(&self) -> Result<Vec<(PathBuf, Metric)>, PersistenceError> {
        load_entries(&self.root.join(METRICS_DIR), parse_metric)
    }

    fn load_workouts(&self) -> Result<Vec<(PathBuf, Workout)>, PersistenceError> {
        load_entries(&self.root.join(WORKOUTS_DIR), parse_workout)
    }

    /// The metric stored under exactly `id`, reading only files named for it.
    fn named_metric(&self, id: &str) -> Result<Option<(PathBuf, Metric)>, PersistenceError> {
        let paths = named_files(&self.root.join(METRICS_DIR), id)?;
        Ok(parse_files(paths, parse_metric)
            .into_iter()
            .find(|(_, m)| m.id == id))
    }

    /// The workout stored under exactly `id`, reading only files named for it.
    fn named_workout(&self, id: &str) -> Result<Option<(PathBuf, Workout)>, PersistenceError> {
        let paths = named_files(&self.root.join(WORKOUTS_DIR), id)?;
        Ok(parse_files(paths, parse_workout)
            .into_iter()
            .find(|(_, w)| w.id == id))
    }

    fn find_metric(&self, id_or_prefix: &str) -> Result<(PathBuf, Metric), PersistenceError> {
        let entries = self.load_metrics()?;
        let id = resolve(EntityKind::Metric, id_or_prefix, entries.iter().map(|(_, m)| &m.id))?;
        entries
            .into_iter()
            .find(|(_, m)| m.id == id)
            .ok_or_else(|| PersistenceError::not_found(EntityKind::Metric, id))
    }

    fn find_workout(&self, id_or_prefix: &str) -> Result<(PathBuf, Workout), PersistenceError> {
        let entries = self.load_workouts()?;
        let id = resolve(EntityKind::Workout, id_or_prefix, entries.iter().map(|(_, w)| &w.id))?;
        entries
            .into_iter()
            .find(|(_, w)| w.id == id)
            .ok_or_else(|| PersistenceError::not_found(EntityKind::Workout, id))
    }

    /// The workout file holding the resolved workout metric, plus the
    /// metric's full id.
    fn find_workout_metric(
        &self,
        id_or_prefix: &str,
    ) -> Result<(PathBuf, Workout, String), PersistenceError> {
        let entries = self.load_workouts()?;
        let id = resolve(
            EntityKind::WorkoutMetric,
            id_or_prefix,
            entries
                .iter()
                .flat_map(|(_, w)| w.metrics.iter().map(|m| &m.id)),
        )?;
        entries
            .into_iter()
            .find(|(_, w)| w.metrics.iter().any(|m| m.id == id))
            .map(|(path, workout)| (path, workout, id.clone()))
            .ok_or_else(|| PersistenceError::not_found(EntityKind::WorkoutMetric, id))
    }
}

/// Parse every `.md` file under `dir`. Unparsable files are logged and skipped.
fn load_entries<T>(
    dir: &Path,
    parse: fn(&Path, &str) -> Result<T, PersistenceError>,
) -> Result<Vec<(PathBuf, T)>, PersistenceError> {
    Ok(parse_files(layout::markdown_files(dir)?, parse))
}

fn named_files(dir: &Path, id: &str) -> Result<Vec<PathBuf>, PersistenceError> {
    let mut paths = layout::markdown_files(dir)?;
    paths.retain(|path| layout::is_named_for(path, id));
    Ok(paths)
}

fn parse_files<T>(
    paths: Vec<PathBuf>,
    parse: fn(&Path, &str) -> Result<T, PersistenceError>,
) -> Vec<(PathBuf, T)> {
    let mut entries = Vec::new();
    for path in paths {
        let parsed = fs::read_to_string(&path)
            .map_err(PersistenceError::from)
            .and_then(|content| parse(&path, &content));
        match parsed {
            Ok(entity) => entries.push((path, entity)),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable record"),
        }
    }
    entries
}

fn resolve<'a>(
    kind: EntityKind,
    id_or_prefix: &str,
    ids: impl Iterator<Item = &'a String>,
) -> Result<String, PersistenceError> {
    match Lookup::parse(kind, id_or_prefix)? {
        Lookup::Exact(id) => ids
            .cloned()
            .find(|candidate| candidate.as_str() == id)
            .ok_or_else(|| PersistenceError::not_found(kind, id)),
        Lookup::Prefix(prefix) => classify_matches(kind, prefix, ids.cloned()),
    }
}

fn apply_limit<T>(items: &mut Vec<T>, limit: i64) {
    if let Ok(limit) = usize::try_from(limit) {
        if limit > 0 {
            items.truncate(limit);
        }
    }
}

fn sort_metrics(metrics: &mut [Metric]) {
    metrics.sort_by(|a, b| {
        b.recorded_at
            .cmp(&a.recorded_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

fn sort_workouts(workouts: &mut [Workout]) {
    workouts.sort_by(|a, b| {
        b.started_at
            .cmp(&a.started_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

fn sort_workout_metrics(metrics: &mut [WorkoutMetric]) {
    metrics.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

/// A free path for a new record with `id`, falling back to the full-id file
/// name when the short one belongs to another record.
fn vacant_path(path: PathBuf, id: &str) -> Result<PathBuf, PersistenceError> {
    if !path.exists() {
        return Ok(path);
    }
    let full = layout::full_id_path(&path, id);
    if full.exists() {
        return Err(PersistenceError::Validation(format!(
            "{} already exists",
            full.display()
        )));
    }
    Ok(full)
}

impl MetricRepository for MarkdownRepository {
    async fn create_metric(&self, metric: &Metric) -> Result<(), PersistenceError> {
        if self.named_metric(&metric.id)?.is_some() {
            return Err(PersistenceError::AlreadyExists {
                kind: EntityKind::Metric,
                id: metric.id.clone(),
            });
        }

        let path = vacant_path(layout::metric_path(&self.root, metric), &metric.id)?;
        layout::write_atomic(&path, &render_metric(metric)?)
    }

    async fn get_metric(&self, id_or_prefix: &str) -> Result<Metric, PersistenceError> {
        Ok(self.find_metric(id_or_prefix)?.1)
    }

    async fn list_metrics(
        &self,
        metric_type: Option<MetricType>,
        limit: i64,
    ) -> Result<Vec<Metric>, PersistenceError> {
        let mut metrics: Vec<Metric> = self
            .load_metrics()?
            .into_iter()
            .map(|(_, m)| m)
            .filter(|m| metric_type.map_or(true, |t| m.metric_type == t))
            .collect();
        sort_metrics(&mut metrics);
        apply_limit(&mut metrics, limit);
        Ok(metrics)
    }

    async fn delete_metric(&self, id_or_prefix: &str) -> Result<(), PersistenceError> {
        let (path, metric) = self.find_metric(id_or_prefix)?;
        fs::remove_file(&path)?;
        tracing::debug!(id = %metric.id, "Deleted metric");
        Ok(())
    }
}

impl WorkoutRepository for MarkdownRepository {
    async fn create_workout(&self, workout: &Workout) -> Result<(), PersistenceError> {
        if self.named_workout(&workout.id)?.is_some() {
            return Err(PersistenceError::AlreadyExists {
                kind: EntityKind::Workout,
                id: workout.id.clone(),
            });
        }

        let workout = workout.without_metrics();
        let path = vacant_path(layout::workout_path(&self.root, &workout), &workout.id)?;
        layout::write_atomic(&path, &render_workout(&workout)?)
    }

    async fn get_workout(&self, id_or_prefix: &str) -> Result<Workout, PersistenceError> {
        let (_, mut workout) = self.find_workout(id_or_prefix)?;
        sort_workout_metrics(&mut workout.metrics);
        Ok(workout)
    }

    async fn list_workouts(
        &self,
        workout_type: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Workout>, PersistenceError> {
        let mut workouts: Vec<Workout> = self
            .load_workouts()?
            .into_iter()
            .map(|(_, w)| w.without_metrics())
            .filter(|w| workout_type.map_or(true, |t| w.workout_type == t))
            .collect();
        sort_workouts(&mut workouts);
        apply_limit(&mut workouts, limit);
        Ok(workouts)
    }

    async fn delete_workout(&self, id_or_prefix: &str) -> Result<(), PersistenceError> {
        let (path, workout) = self.find_workout(id_or_prefix)?;
        fs::remove_file(&path)?;
        tracing::debug!(id = %workout.id, metrics = workout.metrics.len(), "Deleted workout");
        Ok(())
    }

    /// Duplicate ids are detected within the owning workout's file.
    async fn add_workout_metric(&self, metric: &WorkoutMetric) -> Result<(), PersistenceError> {
        let (path, mut workout) = self.named_workout(&metric.workout_id)?.ok_or_else(|| {
            PersistenceError::not_found(EntityKind::Workout, metric.workout_id.as_str())
        })?;
        if workout.metrics.iter().any(|m| m.id == metric.id) {
            return Err(PersistenceError::AlreadyExists {
                kind: EntityKind::WorkoutMetric,
                id: metric.id.clone(),
            });
        }

        workout.metrics.push(metric.clone());
        layout::write_atomic(&path, &render_workout(&workout)?)
    }

    async fn get_workout_metric(&self, id_or_prefix: &str) -> Result<WorkoutMetric, PersistenceError> {
        let (_, workout, id) = self.find_workout_metric(id_or_prefix)?;
        workout
            .metrics
            .into_iter()
            .find(|m| m.id == id)
            .ok_or_else(|| PersistenceError::not_found(EntityKind::WorkoutMetric, id))
    }

    async fn list_workout_metrics(
        &self,
        workout_id: &str,
    ) -> Result<Vec<WorkoutMetric>, PersistenceError> {
        let Some((_, workout)) = self.named_workout(workout_id)? else {
            return Ok(vec![]);
        };

        let mut metrics = workout.metrics;
        sort_workout_metrics(&mut metrics);
        Ok(metrics)
    }

    async fn delete_workout_metric(&self, id_or_prefix: &str) -> Result<(), PersistenceError> {
        let (path, mut workout, id) = self.find_workout_metric(id_or_prefix)?;
        workout.metrics.retain(|m| m.id != id);
        layout::write_atomic(&path, &render_workout(&workout)?)
    }
}

impl Repository for MarkdownRepository {
    /// One walk over each directory rather than a lookup per workout.
    async fn get_all_data(&self) -> Result<ExportBundle, PersistenceError> {
        let mut metrics: Vec<Metric> = self.load_metrics()?.into_iter().map(|(_, m)| m).collect();
        sort_metrics(&mut metrics);

        let mut workouts: Vec<Workout> = self
            .load_workouts()?
            .into_iter()
            .map(|(_, mut w)| {
                sort_workout_metrics(&mut w.metrics);
                w
            })
            .collect();
        sort_workouts(&mut workouts);

        Ok(ExportBundle::new(metrics, workouts))
    }

    async fn close(&self) -> Result<(), PersistenceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn test_repo() -> (tempfile::TempDir, MarkdownRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = MarkdownRepository::new(dir.path());
        (dir, repo)
    }

    fn sample_metric(metric_type: MetricType, value: f64, minutes_ago: i64) -> Metric {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        Metric::new(metric_type, value, Some(base - Duration::minutes(minutes_ago)), None)
    }

    fn sample_workout(workout_type: &str) -> Workout {
        Workout::new(
            workout_type,
            Some(Utc.with_ymd_and_hms(2024, 6, 2, 18, 0, 0).unwrap()),
            Some(45),
            Some("felt good".to_string()),
        )
    }

    #[tokio::test]
    async fn test_metric_file_lands_in_dated_directory() {
        let (dir, repo) = test_repo();
        let metric = sample_metric(MetricType::Weight, 82.5, 0);
        repo.create_metric(&metric).await.unwrap();

        let expected = dir
            .path()
            .join("metrics/2024/06")
            .join(format!("2024-06-01-weight-{}.md", &metric.id[..8]));
        assert!(expected.is_file());
        assert_eq!(repo.get_metric(&metric.id[..8]).await.unwrap(), metric);
    }

    #[tokio::test]
    async fn test_duplicate_create_is_rejected() {
        let (_dir, repo) = test_repo();
        let metric = sample_metric(MetricType::Steps, 9000.0, 0);
        repo.create_metric(&metric).await.unwrap();
        let err = repo.create_metric(&metric).await.unwrap_err();
        assert!(matches!(err, PersistenceError::AlreadyExists { .. }));

        let workout = sample_workout("run");
        repo.create_workout(&workout).await.unwrap();
        let err = repo.create_workout(&workout).await.unwrap_err();
        assert!(matches!(err, PersistenceError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_short_id_collision_uses_full_id_name() {
        let (dir, repo) = test_repo();
        let mut first = sample_metric(MetricType::Weight, 82.0, 0);
        let mut second = sample_metric(MetricType::Weight, 81.0, 5);
        first.id = "0a1b2c3d-0000-4000-8000-000000000001".to_string();
        second.id = "0a1b2c3d-0000-4000-8000-000000000002".to_string();
        repo.create_metric(&first).await.unwrap();
        repo.create_metric(&second).await.unwrap();

        let day = dir.path().join("metrics/2024/06");
        assert!(day.join(format!("2024-06-01-weight-{}.md", second.id)).is_file());

        for m in [&first, &second] {
            let err = repo.create_metric(m).await.unwrap_err();
            assert!(matches!(err, PersistenceError::AlreadyExists { .. }));
            assert_eq!(&repo.get_metric(&m.id).await.unwrap(), m);
        }
    }

    #[tokio::test]
    async fn test_duplicate_workout_metric_is_rejected() {
        let (_dir, repo) = test_repo();
        let workout = sample_workout("run");
        repo.create_workout(&workout).await.unwrap();
        let distance = WorkoutMetric::new(&workout.id, "distance", 5.0, None);
        repo.add_workout_metric(&distance).await.unwrap();

        let err = repo.add_workout_metric(&distance).await.unwrap_err();
        assert!(matches!(err, PersistenceError::AlreadyExists { .. }));
        assert_eq!(repo.list_workout_metrics(&workout.id).await.unwrap(), vec![distance]);
    }

    #[tokio::test]
    async fn test_get_all_data_populates_and_orders() {
        let (_dir, repo) = test_repo();
        let older = sample_workout("run");
        let mut newer = sample_workout("swim");
        newer.started_at += Duration::hours(2);
        for w in [&older, &newer] {
            repo.create_workout(w).await.unwrap();
        }
        let laps = WorkoutMetric::new(&newer.id, "laps", 40.0, None);
        repo.add_workout_metric(&laps).await.unwrap();
        repo.create_metric(&sample_metric(MetricType::Weight, 82.0, 0)).await.unwrap();

        let bundle = repo.get_all_data().await.unwrap();
        assert_eq!(bundle.metrics.len(), 1);
        let ids: Vec<&str> = bundle.workouts.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec![newer.id.as_str(), older.id.as_str()]);
        assert_eq!(bundle.workouts[0].metrics, vec![laps]);
        assert!(bundle.workouts[1].metrics.is_empty());
    }

    #[tokio::test]
    async fn test_list_orders_and_limits() {
        let (_dir, repo) = test_repo();
        let old = sample_metric(MetricType::Weight, 84.0, 120);
        let new = sample_metric(MetricType::Weight, 83.0, 10);
        let other = sample_metric(MetricType::HeartRate, 61.0, 0);
        for m in [&old, &new, &other] {
            repo.create_metric(m).await.unwrap();
        }

        let all = repo.list_metrics(None, 0).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec![other.id.as_str(), new.id.as_str(), old.id.as_str()]);
        assert_eq!(repo.list_metrics(Some(MetricType::Weight), 1).await.unwrap()[0].id, new.id);
        assert_eq!(repo.list_metrics(None, -5).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unparsable_files_are_skipped() {
        let (dir, repo) = test_repo();
        let metric = sample_metric(MetricType::Mood, 7.0, 0);
        repo.create_metric(&metric).await.unwrap();

        let junk_dir = dir.path().join("metrics/2024/06");
        fs::write(junk_dir.join("2024-06-01-mood-broken00.md"), "no front matter").unwrap();

        let listed = repo.list_metrics(None, 0).await.unwrap();
        assert_eq!(listed, vec![metric]);
    }

    #[tokio::test]
    async fn test_workout_metric_mutation_rewrites_file() {
        let (dir, repo) = test_repo();
        let workout = sample_workout("Trail Run");
        repo.create_workout(&workout).await.unwrap();

        let distance = WorkoutMetric::new(&workout.id, "distance", 5.2, Some("km".into()));
        repo.add_workout_metric(&distance).await.unwrap();

        let path = dir
            .path()
            .join("workouts/2024/06")
            .join(format!("2024-06-02-trail-run-{}.md", &workout.id[..8]));
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("name: distance"));
        assert!(content.ends_with("felt good"));

        assert_eq!(repo.get_workout_metric(&distance.id[..8]).await.unwrap(), distance);
        repo.delete_workout_metric(&distance.id).await.unwrap();
        assert!(repo.list_workout_metrics(&workout.id).await.unwrap().is_empty());
        assert!(path.is_file());
    }

    #[tokio::test]
    async fn test_add_metric_to_missing_workout_is_not_found() {
        let (_dir, repo) = test_repo();
        let orphan = WorkoutMetric::new(crate::model::new_id(), "distance", 1.0, None);
        assert!(repo.add_workout_metric(&orphan).await.unwrap_err().is_not_found());
        assert!(repo.list_workout_metrics(&orphan.workout_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_workout_removes_file_and_metrics() {
        let (_dir, repo) = test_repo();
        let workout = sample_workout("swim");
        repo.create_workout(&workout).await.unwrap();
        repo.add_workout_metric(&WorkoutMetric::new(&workout.id, "laps", 40.0, None))
            .await
            .unwrap();

        repo.delete_workout(&workout.id[..12]).await.unwrap();
        assert!(repo.get_workout(&workout.id).await.unwrap_err().is_not_found());
        assert!(repo.list_workout_metrics(&workout.id).await.unwrap().is_empty());
        assert!(repo.list_workouts(None, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_root_lists_nothing() {
        let (_dir, repo) = test_repo();
        assert!(repo.list_metrics(None, 0).await.unwrap().is_empty());
        assert!(repo.list_workouts(None, 0).await.unwrap().is_empty());
        assert!(repo.get_metric("abcd").await.unwrap_err().is_not_found());
    }
}
