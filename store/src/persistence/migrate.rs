//! Copy everything from one [`Repository`] into another.
//!
//! The engine is stateless and backend-agnostic: it reads through the source
//! traits and writes through the destination traits, preserving ids and
//! timestamps. It stops at the first failure and reports how far it got.
//! There is no merge; a duplicate id in the destination is an error.

use std::fmt;

use tracing::info;

use super::traits::Repository;
use super::PersistenceError;

/// Counts of entities written to the destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub metrics: u64,
    pub workouts: u64,
    pub workout_metrics: u64,
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} metrics, {} workouts, {} workout metrics",
            self.metrics, self.workouts, self.workout_metrics
        )
    }
}

#[derive(Debug, thiserror::Error)]
#[error("migration stopped after {report}: {source}")]
pub struct MigrationError {
    /// What was written before the failure.
    pub report: MigrationReport,
    pub source: PersistenceError,
}

pub async fn migrate_data<S, D>(source: &S, dest: &D) -> Result<MigrationReport, MigrationError>
where
    S: Repository,
    D: Repository,
{
    info!("Starting data migration");

    let mut report = MigrationReport::default();
    if let Err(err) = copy_all(source, dest, &mut report).await {
        return Err(MigrationError { report, source: err });
    }

    info!(
        metrics = report.metrics,
        workouts = report.workouts,
        workout_metrics = report.workout_metrics,
        "Data migration completed"
    );
    Ok(report)
}

async fn copy_all<S, D>(
    source: &S,
    dest: &D,
    report: &mut MigrationReport,
) -> Result<(), PersistenceError>
where
    S: Repository,
    D: Repository,
{
    let snapshot = source.get_all_data().await?;
    for metric in &snapshot.metrics {
        dest.create_metric(metric).await?;
        report.metrics += 1;
    }

    for workout in &snapshot.workouts {
        dest.create_workout(&workout.without_metrics()).await?;
        report.workouts += 1;

        for metric in &workout.metrics {
            dest.add_workout_metric(metric).await?;
            report.workout_metrics += 1;
        }
    }
    Ok(())
}
