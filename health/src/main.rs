//! Health CLI - record metrics and workouts, export, migrate and sync.
//!
//! The storage backend (SQLite or a Markdown directory) is chosen once at
//! startup from `--backend` or `HEALTH_BACKEND` and handed to the command
//! handlers explicitly; see [`config`] for all tunables.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use health_store::persistence::{Database, MarkdownRepository, SqliteRepository};
use health_store::{MigrationError, PersistenceError, Repository};
use health_store::sync::SyncError;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;

use config::Backend;

#[derive(Parser)]
#[command(name = "health", about = "Personal health metrics and workout tracker")]
struct Cli {
    /// Storage backend. Defaults to `HEALTH_BACKEND`, then SQLite.
    #[arg(long, value_enum, global = true)]
    backend: Option<Backend>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record and inspect health metrics.
    Metric {
        #[command(subcommand)]
        action: MetricAction,
    },
    /// Record and inspect workouts.
    Workout {
        #[command(subcommand)]
        action: WorkoutAction,
    },
    /// Write everything to stdout or a file.
    Export {
        #[arg(short, long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Load a JSON or YAML export. Ids are preserved; duplicates fail.
    Import { file: PathBuf },
    /// Copy all data into the other backend.
    Migrate {
        #[arg(long, value_enum)]
        to: Backend,
        /// Destination database file or Markdown directory.
        #[arg(long)]
        dest: Option<PathBuf>,
    },
    /// Replay remote changes into the SQLite store.
    Sync {
        #[command(subcommand)]
        action: SyncAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum MetricAction {
    Add {
        metric_type: String,
        value: f64,
        /// RFC 3339 time of the measurement. Defaults to now.
        #[arg(long)]
        at: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    List {
        #[arg(long = "type")]
        metric_type: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    Show {
        id: String,
    },
    Latest {
        metric_type: String,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand)]
pub(crate) enum WorkoutAction {
    Add {
        workout_type: String,
        /// Duration in minutes.
        #[arg(long)]
        duration: Option<i64>,
        /// RFC 3339 start time. Defaults to now.
        #[arg(long)]
        at: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    List {
        #[arg(long = "type")]
        workout_type: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    Show {
        id: String,
    },
    Delete {
        id: String,
    },
    /// Attach a named measurement to a workout.
    MetricAdd {
        workout: String,
        name: String,
        value: f64,
        #[arg(long)]
        unit: Option<String>,
    },
    MetricDelete {
        id: String,
    },
}

#[derive(Subcommand)]
pub(crate) enum SyncAction {
    /// Apply a JSON-lines file of change records.
    Apply { file: PathBuf },
    /// Print how many workout metrics are waiting for their workout.
    Pending,
    /// Drop waiting workout metrics older than the given age.
    Expire {
        #[arg(long, default_value_t = 30)]
        older_than_days: i64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub(crate) enum ExportFormat {
    Json,
    Yaml,
    Markdown,
}

/// Error type for CLI operations.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error(transparent)]
    Store(#[from] PersistenceError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Usage(String),
}

/// The repository selected for this run.
enum Store {
    Sqlite(SqliteRepository),
    Markdown(MarkdownRepository),
}

impl Store {
    async fn open(backend: Backend) -> Result<Self, CliError> {
        match backend {
            Backend::Sqlite => {
                let db = Database::open(&config::get_db_path(), config::get_busy_timeout()).await?;
                Ok(Store::Sqlite(SqliteRepository::new(db.pool().clone())))
            }
            Backend::Markdown => Ok(Store::Markdown(MarkdownRepository::new(
                config::get_records_dir(),
            ))),
        }
    }
}

async fn run<R: Repository>(repo: &R, backend: Backend, command: Commands) -> Result<(), CliError> {
    let result = match command {
        Commands::Metric { action } => commands::metric(repo, action).await,
        Commands::Workout { action } => commands::workout(repo, action).await,
        Commands::Export { format, output } => {
            commands::export(repo, format, output.as_deref()).await
        }
        Commands::Import { file } => commands::import(repo, &file).await,
        Commands::Migrate { to, dest } => commands::migrate(repo, backend, to, dest).await,
        Commands::Sync { .. } => Err(CliError::Usage("sync is handled before opening a store".into())),
    };
    repo.close().await?;
    result
}

/// Stderr logging filtered by `RUST_LOG` (default `warn`), plus a daily
/// rolling file when `HEALTH_LOG_DIR` is set.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr = fmt::layer().with_writer(std::io::stderr).with_filter(filter());

    match config::get_log_dir() {
        Some(log_dir) => {
            std::fs::create_dir_all(&log_dir).ok();
            let file_appender = tracing_appender::rolling::daily(log_dir, "health");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::registry()
                .with(stderr)
                .with(
                    fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true)
                        .with_line_number(true)
                        .with_filter(filter()),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(stderr).init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = init_tracing();

    let cli = Cli::parse();
    let backend = cli.backend.unwrap_or_else(config::get_backend);
    tracing::debug!(?backend, data_dir = %config::get_data_dir().display(), "Starting health");

    if let Commands::Sync { action } = cli.command {
        commands::sync(action).await?;
        return Ok(());
    }

    match Store::open(backend).await? {
        Store::Sqlite(repo) => run(&repo, backend, cli.command).await?,
        Store::Markdown(repo) => run(&repo, backend, cli.command).await?,
    }
    Ok(())
}
