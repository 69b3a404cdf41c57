//! Storage layer: the repository contract, the SQLite and Markdown backends,
//! and the engine that migrates data between them.

pub mod markdown;
pub mod migrate;
pub mod prefix;
pub mod sqlite;
pub mod traits;


pub use markdown::MarkdownRepository;
pub use migrate::{migrate_data, MigrationError, MigrationReport};
pub use sqlite::{Database, SqliteRepository};
pub use traits::{MetricRepository, Repository, WorkoutRepository};

use std::fmt;

/// The entity kinds a repository stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Metric,
    Workout,
    WorkoutMetric,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Metric => "metric",
            EntityKind::Workout => "workout",
            EntityKind::WorkoutMetric => "workout metric",
        })
    }
}

/// Errors from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },
    #[error("ambiguous {kind} prefix {prefix:?}: {matches} matches")]
    Ambiguous {
        kind: EntityKind,
        prefix: String,
        matches: usize,
    },
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: EntityKind, id: String },
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Schema migration failed: {0}")]
    Migration(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl PersistenceError {
    pub(crate) fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        PersistenceError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PersistenceError::NotFound { .. })
    }
}
