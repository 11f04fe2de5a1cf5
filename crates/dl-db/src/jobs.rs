//! Ingest-job records: one row per bulk-ingest request, carrying lifecycle
//! timestamps, aggregate counters, and the terminal error summary.
//!
//! Two write paths with distinct `finished_at` rules:
//! - [`update_progress`] never touches `finished_at`;
//! - [`finalize`] stamps it exactly when the state is terminal.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(JobState::Running),
            "succeeded" => Ok(JobState::Succeeded),
            "failed" => Ok(JobState::Failed),
            other => Err(anyhow!("invalid job state: {}", other)),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub state: JobState,
    pub requested_start: NaiveDate,
    pub requested_end: NaiveDate,
    pub universe_symbols_considered: i64,
    pub symbols_attempted: i64,
    pub symbols_succeeded: i64,
    pub symbols_failed: i64,
    pub last_error: Option<String>,
}

/// Counter snapshot written by the worker.
#[derive(Debug, Clone, PartialEq)]
pub struct JobProgress {
    pub state: JobState,
    pub attempted: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub last_error: Option<String>,
}

/// Insert a fresh `running` job row and return its id.
///
/// `created_at = started_at = now`, `finished_at = null`, counters zero.
pub async fn create(
    pool: &SqlitePool,
    requested_start: NaiveDate,
    requested_end: NaiveDate,
    universe_symbols_considered: i64,
) -> Result<Uuid> {
    let job_id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        insert into ingest_jobs (
          id, created_at, started_at, finished_at, state,
          requested_start, requested_end, universe_symbols_considered,
          symbols_attempted, symbols_succeeded, symbols_failed, last_error
        )
        values (?1, ?2, ?3, null, 'running', ?4, ?5, ?6, 0, 0, 0, null)
        "#,
    )
    .bind(job_id.to_string())
    .bind(now)
    .bind(now)
    .bind(requested_start)
    .bind(requested_end)
    .bind(universe_symbols_considered)
    .execute(pool)
    .await
    .context("create ingest job failed")?;

    Ok(job_id)
}

/// Partial counter update while the job runs. Never sets `finished_at`.
pub async fn update_progress(pool: &SqlitePool, job_id: Uuid, progress: &JobProgress) -> Result<()> {
    sqlx::query(
        r#"
        update ingest_jobs
        set state = ?1,
            symbols_attempted = ?2,
            symbols_succeeded = ?3,
            symbols_failed = ?4,
            last_error = ?5
        where id = ?6
        "#,
    )
    .bind(progress.state.as_str())
    .bind(progress.attempted)
    .bind(progress.succeeded)
    .bind(progress.failed)
    .bind(&progress.last_error)
    .bind(job_id.to_string())
    .execute(pool)
    .await
    .context("update_progress failed")?;
    Ok(())
}

/// Write the final counters and, for a terminal state, stamp `finished_at`.
///
/// Called with `state = running` this degrades to a plain progress update,
/// so a paused job keeps `finished_at` null. A finished job re-finalized by
/// an idempotent resume keeps its original `finished_at`.
pub async fn finalize(pool: &SqlitePool, job_id: Uuid, progress: &JobProgress) -> Result<()> {
    if !progress.state.is_terminal() {
        return update_progress(pool, job_id, progress).await;
    }

    sqlx::query(
        r#"
        update ingest_jobs
        set state = ?1,
            symbols_attempted = ?2,
            symbols_succeeded = ?3,
            symbols_failed = ?4,
            last_error = ?5,
            finished_at = coalesce(finished_at, ?6)
        where id = ?7
        "#,
    )
    .bind(progress.state.as_str())
    .bind(progress.attempted)
    .bind(progress.succeeded)
    .bind(progress.failed)
    .bind(&progress.last_error)
    .bind(Utc::now())
    .bind(job_id.to_string())
    .execute(pool)
    .await
    .context("finalize job failed")?;
    Ok(())
}

/// Fetch one job by id.
pub async fn get(pool: &SqlitePool, job_id: Uuid) -> Result<Option<JobRecord>> {
    let row = sqlx::query(
        r#"
        select id, created_at, started_at, finished_at, state,
               requested_start, requested_end, universe_symbols_considered,
               symbols_attempted, symbols_succeeded, symbols_failed, last_error
        from ingest_jobs
        where id = ?1
        "#,
    )
    .bind(job_id.to_string())
    .fetch_optional(pool)
    .await
    .context("get job failed")?;

    row.map(job_from_row).transpose()
}

/// Fetch the most recently created job, if any.
pub async fn get_latest(pool: &SqlitePool) -> Result<Option<JobRecord>> {
    let row = sqlx::query(
        r#"
        select id, created_at, started_at, finished_at, state,
               requested_start, requested_end, universe_symbols_considered,
               symbols_attempted, symbols_succeeded, symbols_failed, last_error
        from ingest_jobs
        order by created_at desc
        limit 1
        "#,
    )
    .fetch_optional(pool)
    .await
    .context("get latest job failed")?;

    row.map(job_from_row).transpose()
}

fn job_from_row(row: sqlx::sqlite::SqliteRow) -> Result<JobRecord> {
    let id_text: String = row.try_get("id")?;
    let state_text: String = row.try_get("state")?;

    Ok(JobRecord {
        id: Uuid::parse_str(&id_text).with_context(|| format!("invalid job id: {id_text}"))?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
        state: JobState::parse(&state_text)?,
        requested_start: row.try_get("requested_start")?,
        requested_end: row.try_get("requested_end")?,
        universe_symbols_considered: row.try_get("universe_symbols_considered")?,
        symbols_attempted: row.try_get("symbols_attempted")?,
        symbols_succeeded: row.try_get("symbols_succeeded")?,
        symbols_failed: row.try_get("symbols_failed")?,
        last_error: row.try_get("last_error")?,
    })
}
