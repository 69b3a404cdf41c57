//! Storage core for the health tracker.
//!
//! - [`model`] — the three entity kinds and the metric type catalogue.
//! - [`persistence`] — the repository contract, the SQLite and Markdown
//!   backends, and the cross-backend migration engine.
//! - [`export`] — the export bundle and its JSON / YAML / Markdown forms.
//! - [`sync`] — replay of remote change records into the SQLite store.

pub mod export;
pub mod model;
pub mod persistence;
pub mod sync;
pub mod timestamp;

pub use export::ExportBundle;
pub use model::{Metric, MetricType, Workout, WorkoutMetric};
pub use persistence::{
    migrate_data, EntityKind, MetricRepository, MigrationError, MigrationReport,
    PersistenceError, Repository, WorkoutRepository,
};
