//! dl-ingest
//!
//! The resumable bulk-ingest scheduler: expands a request into a durable
//! queue of `(symbol, window)` items, drains it on a single background task
//! per job, survives crashes, and keeps job counters reconciled with queue
//! truth at all times.

use std::sync::Arc;

use sqlx::SqlitePool;

use dl_config::IngestConfig;
use dl_md::OhlcvProvider;

mod error;
mod scheduler;
mod windows;
mod worker;

pub use error::IngestError;
pub use scheduler::{
    archive_with_keep_days, progress, resume, start_resumable, ArchiveReport, IngestRequest,
    ProgressReport, StartedJob,
};
pub use windows::{partition_windows, Window};
pub use worker::{run_worker, ArchivePolicy};

/// Everything the scheduler and worker need, cheap to clone into tasks.
#[derive(Clone)]
pub struct IngestDeps {
    pub pool: SqlitePool,
    pub provider: Arc<dyn OhlcvProvider>,
    pub config: IngestConfig,
}
