//! Command handlers. Each takes the repository chosen in `main` explicitly.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use health_store::persistence::{Database, MarkdownRepository, SqliteRepository};
use health_store::sync::{run_sync_pass, ChangeApplier, MemoryFeed, SyncReport};
use health_store::{
    migrate_data, timestamp, ExportBundle, Metric, MetricType, MigrationReport, Repository,
    Workout, WorkoutMetric,
};

use crate::config::{self, Backend};
use crate::{CliError, ExportFormat, MetricAction, SyncAction, WorkoutAction};

pub async fn metric<R: Repository>(repo: &R, action: MetricAction) -> Result<(), CliError> {
    match action {
        MetricAction::Add {
            metric_type,
            value,
            at,
            notes,
        } => {
            let metric_type: MetricType = metric_type.parse()?;
            let metric = Metric::new(metric_type, value, parse_at(at.as_deref())?, notes);
            repo.create_metric(&metric).await?;
            println!("Recorded {} {} {} ({})", metric_type, metric.value, metric.unit, short(&metric.id));
        }
        MetricAction::List { metric_type, limit } => {
            let metric_type = metric_type.map(|t| t.parse::<MetricType>()).transpose()?;
            let metrics = repo.list_metrics(metric_type, limit).await?;
            if metrics.is_empty() {
                println!("No metrics recorded.");
            }
            for m in &metrics {
                println!("{}", metric_line(m));
            }
        }
        MetricAction::Show { id } => {
            let m = repo.get_metric(&id).await?;
            println!("id:          {}", m.id);
            println!("type:        {}", m.metric_type);
            println!("value:       {} {}", m.value, m.unit);
            println!("recorded at: {}", timestamp::format(&m.recorded_at));
            println!("created at:  {}", timestamp::format(&m.created_at));
            if let Some(notes) = &m.notes {
                println!("notes:\n{notes}");
            }
        }
        MetricAction::Latest { metric_type } => {
            let m = repo.get_latest_metric(metric_type.parse()?).await?;
            println!("{}", metric_line(&m));
        }
        MetricAction::Delete { id } => {
            let m = repo.get_metric(&id).await?;
            repo.delete_metric(&m.id).await?;
            println!("Deleted metric {}", short(&m.id));
        }
    }
    Ok(())
}

pub async fn workout<R: Repository>(repo: &R, action: WorkoutAction) -> Result<(), CliError> {
    match action {
        WorkoutAction::Add {
            workout_type,
            duration,
            at,
            notes,
        } => {
            let workout = Workout::new(workout_type, parse_at(at.as_deref())?, duration, notes);
            repo.create_workout(&workout).await?;
            println!("Recorded {} workout ({})", workout.workout_type, short(&workout.id));
        }
        WorkoutAction::List { workout_type, limit } => {
            let workouts = repo.list_workouts(workout_type.as_deref(), limit).await?;
            if workouts.is_empty() {
                println!("No workouts recorded.");
            }
            for w in &workouts {
                println!("{}", workout_line(w));
            }
        }
        WorkoutAction::Show { id } => {
            let w = repo.get_workout(&id).await?;
            println!("{}", workout_line(&w));
            for m in &w.metrics {
                println!(
                    "  {}  {} = {}{}",
                    short(&m.id),
                    m.metric_name,
                    m.value,
                    m.unit.as_deref().map(|u| format!(" {u}")).unwrap_or_default()
                );
            }
            if let Some(notes) = &w.notes {
                println!("notes:\n{notes}");
            }
        }
        WorkoutAction::Delete { id } => {
            let w = repo.get_workout(&id).await?;
            repo.delete_workout(&w.id).await?;
            println!("Deleted workout {} and {} metrics", short(&w.id), w.metrics.len());
        }
        WorkoutAction::MetricAdd {
            workout,
            name,
            value,
            unit,
        } => {
            let parent = repo.get_workout(&workout).await?;
            let metric = WorkoutMetric::new(&parent.id, name, value, unit);
            repo.add_workout_metric(&metric).await?;
            println!("Added {} to workout {} ({})", metric.metric_name, short(&parent.id), short(&metric.id));
        }
        WorkoutAction::MetricDelete { id } => {
            let metric = repo.get_workout_metric(&id).await?;
            repo.delete_workout_metric(&metric.id).await?;
            println!("Deleted workout metric {}", short(&metric.id));
        }
    }
    Ok(())
}

pub async fn export<R: Repository>(
    repo: &R,
    format: ExportFormat,
    output: Option<&Path>,
) -> Result<(), CliError> {
    let bundle = repo.get_all_data().await?;
    let rendered = match format {
        ExportFormat::Json => bundle.to_json()?,
        ExportFormat::Yaml => bundle.to_yaml()?,
        ExportFormat::Markdown => bundle.to_markdown(),
    };

    match output {
        Some(path) => {
            std::fs::write(path, rendered)?;
            eprintln!(
                "Exported {} metrics and {} workouts to {}",
                bundle.metrics.len(),
                bundle.workouts.len(),
                path.display()
            );
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

pub async fn import<R: Repository>(repo: &R, file: &Path) -> Result<(), CliError> {
    let raw = std::fs::read_to_string(file)?;
    let bundle = match file.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => ExportBundle::from_yaml(&raw)?,
        _ => ExportBundle::from_json(&raw)?,
    };

    repo.import_data(&bundle).await?;
    println!(
        "Imported {} metrics, {} workouts, {} workout metrics",
        bundle.metrics.len(),
        bundle.workouts.len(),
        bundle.workout_metric_count()
    );
    Ok(())
}

/// Copy everything from `source` (the configured backend) into a fresh
/// store of the other kind.
pub async fn migrate<R: Repository>(
    source: &R,
    from: Backend,
    to: Backend,
    dest: Option<PathBuf>,
) -> Result<(), CliError> {
    if from == to && dest.is_none() {
        return Err(CliError::Usage(
            "source and destination are the same store; pass --dest".to_string(),
        ));
    }

    let report = match to {
        Backend::Sqlite => {
            let path = dest.unwrap_or_else(config::get_db_path);
            let db = Database::open(&path, config::get_busy_timeout()).await?;
            let target = SqliteRepository::new(db.pool().clone());
            let result = migrate_data(source, &target).await;
            target.close().await?;
            result?
        }
        Backend::Markdown => {
            let root = dest.unwrap_or_else(config::get_records_dir);
            let target = MarkdownRepository::new(root);
            migrate_data(source, &target).await?
        }
    };

    print_migration(&report);
    Ok(())
}

pub async fn sync(action: SyncAction) -> Result<(), CliError> {
    let db = Database::open(&config::get_db_path(), config::get_busy_timeout()).await?;
    let applier = ChangeApplier::new(db.pool().clone());

    match action {
        SyncAction::Apply { file } => {
            let raw = std::fs::read_to_string(&file)?;
            let feed = MemoryFeed::from_json_lines(&raw);
            let report = run_sync_pass(&feed, &applier, Vec::new()).await?;
            print_sync(&report);
            let pending = applier.pending_count().await?;
            if pending > 0 {
                println!("{pending} workout metrics waiting for their workout");
            }
        }
        SyncAction::Pending => {
            println!("{}", applier.pending_count().await?);
        }
        SyncAction::Expire { older_than_days } => {
            let removed = applier.expire_pending(expiry_age(older_than_days)?).await?;
            println!("Expired {removed} pending workout metrics");
        }
    }

    db.pool().close().await;
    Ok(())
}

fn expiry_age(days: i64) -> Result<TimeDelta, CliError> {
    if days < 0 {
        return Err(CliError::Usage("--older-than-days must not be negative".to_string()));
    }
    TimeDelta::try_days(days)
        .ok_or_else(|| CliError::Usage(format!("--older-than-days {days} is out of range")))
}

fn parse_at(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, CliError> {
    Ok(raw.map(timestamp::parse).transpose()?)
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn metric_line(m: &Metric) -> String {
    format!(
        "{}  {}  {:<18} {} {}",
        short(&m.id),
        timestamp::format(&m.recorded_at),
        m.metric_type.as_str(),
        m.value,
        m.unit
    )
}

fn workout_line(w: &Workout) -> String {
    let duration = w
        .duration_minutes
        .map(|d| format!("{d} min"))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{}  {}  {:<18} {}",
        short(&w.id),
        timestamp::format(&w.started_at),
        w.workout_type,
        duration
    )
}

fn print_migration(report: &MigrationReport) {
    println!("Migrated {report}");
}

fn print_sync(report: &SyncReport) {
    println!(
        "Applied {}, deferred {}, ignored {}, dropped {}",
        report.applied, report.deferred, report.ignored, report.dropped
    );
}
