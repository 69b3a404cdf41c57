//! SQLite-backed repository implementation.
//!
//! ## Database setup
//!
//! [`Database`] wraps a `sqlx::SqlitePool` configured with:
//! - **WAL mode** — one writer and concurrent readers, so the CLI and a
//!   long-running server process can share the file.
//! - **Busy timeout** — writers wait for the lock instead of failing at once.
//! - **Foreign keys enabled** — `workout_metrics` cascade with their workout.
//! - **Embedded migrations** — `sqlx::migrate!` runs `store/migrations/*.sql`
//!   when [`Database::open`] is called. The schema is idempotent.
//!
//! ## Repository
//!
//! [`SqliteRepository`] holds a `SqlitePool` and implements
//! `MetricRepository` (in `metric_repo`), `WorkoutRepository` (in
//! `workout_repo`) and `Repository` (here).
//!
//! Timestamps are stored as fixed-width RFC 3339 text and parsed strictly on
//! read; see [`crate::timestamp`].

mod database;
pub(crate) mod helpers;
mod metric_repo;
mod workout_repo;

pub use database::{Database, DEFAULT_BUSY_TIMEOUT};

use sqlx::SqlitePool;

use crate::persistence::traits::Repository;
use crate::persistence::PersistenceError;

/// SQLite implementation of [`Repository`].
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl Repository for SqliteRepository {
    async fn close(&self) -> Result<(), PersistenceError> {
        self.pool.close().await;
        Ok(())
    }
}
