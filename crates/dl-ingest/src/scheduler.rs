//! Request validation and expansion: from a caller request to a created job
//! with a fully enqueued `(symbol × window)` work list.

use chrono::{Duration, NaiveDate, Utc};
use tracing::info;
use uuid::Uuid;

use dl_db::{bars, jobs, queue, universe, JobRecord, QueueCounts, UniverseFilters};

use crate::error::IngestError;
use crate::windows::partition_windows;
use crate::worker::ArchivePolicy;
use crate::IngestDeps;

/// A validated bulk-ingest request.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub window_days: i64,
    pub filters: UniverseFilters,
    pub archive_on_finish: bool,
    pub archive_keep_days: Option<i64>,
}

/// What `start_resumable` hands back to the caller. The `archive` policy is
/// carried in memory to the worker task; it is not persisted with the job.
#[derive(Debug, Clone)]
pub struct StartedJob {
    pub job_id: Uuid,
    pub requested_start: NaiveDate,
    pub requested_end: NaiveDate,
    pub window_days: i64,
    pub queued_items: u64,
    pub archive: Option<ArchivePolicy>,
}

/// Queue counts plus job state for one job id.
#[derive(Debug, Clone)]
pub struct ProgressReport {
    pub job: JobRecord,
    pub counts: QueueCounts,
    pub pct_complete: f64,
}

/// Result of an explicit archive run.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveReport {
    pub cutoff_date: NaiveDate,
    pub archived: u64,
    pub deleted_from_live: u64,
}

/// Validate, expand, and enqueue a bulk-ingest request.
///
/// Synchronous part of the command surface: selects the universe, creates
/// the job record, and bulk-inserts the Cartesian product of symbols and
/// windows. The caller is responsible for launching the worker with the
/// returned job id.
pub async fn start_resumable(
    deps: &IngestDeps,
    req: &IngestRequest,
) -> Result<StartedJob, IngestError> {
    if req.start > req.end {
        return Err(IngestError::BadRange {
            start: req.start,
            end: req.end,
        });
    }
    if req.window_days < 1 {
        return Err(IngestError::BadWindow {
            window_days: req.window_days,
        });
    }

    let symbols = universe::select_symbols(&deps.pool, &req.filters).await?;
    if symbols.is_empty() {
        return Err(IngestError::NoUniverseMatch);
    }

    let windows = partition_windows(req.start, req.end, req.window_days);

    let job_id = jobs::create(&deps.pool, req.start, req.end, symbols.len() as i64).await?;

    let mut items = Vec::with_capacity(symbols.len() * windows.len());
    for symbol in &symbols {
        for window in &windows {
            items.push((symbol.clone(), window.start, window.end));
        }
    }
    let queued_items = queue::enqueue(&deps.pool, job_id, &items).await?;

    info!(
        %job_id,
        symbols = symbols.len(),
        windows = windows.len(),
        queued_items,
        "ingest job created"
    );

    let archive = if req.archive_on_finish {
        req.archive_keep_days.map(|keep_days| ArchivePolicy { keep_days })
    } else {
        None
    };

    Ok(StartedJob {
        job_id,
        requested_start: req.start,
        requested_end: req.end,
        window_days: req.window_days,
        queued_items,
        archive,
    })
}

/// Look up a job before re-entering the worker loop for it.
///
/// The worker loop itself is idempotent (stale reset + reconciliation +
/// terminal-state-aware popping), so this only has to check existence.
pub async fn resume(deps: &IngestDeps, job_id: Uuid) -> Result<JobRecord, IngestError> {
    jobs::get(&deps.pool, job_id)
        .await?
        .ok_or(IngestError::JobNotFound(job_id))
}

/// Progress for one job: queue-truth counts, the job record, and a percent
/// complete derived from terminal items over total.
pub async fn progress(deps: &IngestDeps, job_id: Uuid) -> Result<ProgressReport, IngestError> {
    let job = jobs::get(&deps.pool, job_id)
        .await?
        .ok_or(IngestError::JobNotFound(job_id))?;
    let counts = queue::counts(&deps.pool, job_id).await?;

    let done = (counts.succeeded + counts.failed) as f64;
    let pct_complete = done / (counts.total.max(1) as f64) * 100.0;

    Ok(ProgressReport {
        job,
        counts,
        pct_complete,
    })
}

/// Explicit archive run: move bars older than `today - keep_days` into the
/// archive table.
pub async fn archive_with_keep_days(
    deps: &IngestDeps,
    keep_days: i64,
) -> Result<ArchiveReport, IngestError> {
    let floor = deps.config.min_archive_keep_days;
    if keep_days < floor {
        return Err(IngestError::BadInput(format!(
            "keep_days must be >= {floor}, got {keep_days}"
        )));
    }

    let cutoff_date = Utc::now().date_naive() - Duration::days(keep_days);
    let outcome = bars::archive_before(&deps.pool, cutoff_date).await?;

    info!(
        %cutoff_date,
        archived = outcome.archived,
        deleted_from_live = outcome.deleted_from_live,
        "archive run complete"
    );

    Ok(ArchiveReport {
        cutoff_date,
        archived: outcome.archived,
        deleted_from_live: outcome.deleted_from_live,
    })
}
