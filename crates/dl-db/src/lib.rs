//! dl-db
//!
//! All durable state for the ingest service, in one embedded SQLite file:
//! daily bars (live + archive twin), the symbol universe, ingest jobs, and
//! the ingest work queue.
//!
//! Writers open short transactions and commit quickly; every public write is
//! a single statement or a single transaction, so a crash never leaves
//! partially visible state.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

pub mod bars;
pub mod jobs;
pub mod queue;
pub mod universe;

pub use bars::{ArchiveOutcome, BarUpsertOutcome};
pub use jobs::{JobProgress, JobRecord, JobState};
pub use queue::{QueueCounts, QueueItem};
pub use universe::{UniverseFilters, UniverseRow};

/// Open (creating if missing) the SQLite file at `path`.
pub async fn connect(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open sqlite db at {}", path.display()))?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Connect and migrate in one step. This is what the daemon and the tests use.
pub async fn open_store(path: &Path) -> Result<SqlitePool> {
    let pool = connect(path).await?;
    migrate(&pool).await?;
    Ok(pool)
}
