//! Durable work queue for ingest jobs.
//!
//! One row per `(job_id, symbol, window_start, window_end)` item. State
//! machine per item:
//!
//! ```text
//! pending ──pop──▶ running ──succeed──▶ succeeded
//!                  │
//!                  └──fail──▶ failed ──pop (attempts < max)──▶ running ...
//! running ──stale-recovery──▶ pending
//! ```
//!
//! Pop ordering is part of the contract: pending before failed, then lower
//! attempts, then symbol ascending. It makes resume deterministic and
//! retries fair.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use std::time::Duration;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Hard cap applied to stored `last_error` text.
const LAST_ERROR_MAX_CHARS: usize = 500;

/// A claimed work item, returned by [`pop_next`].
///
/// `attempts` already includes the attempt being started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    pub job_id: Uuid,
    pub symbol: String,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub attempts: i64,
}

/// Aggregate per-state counts for one job's queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueueCounts {
    pub pending: i64,
    pub running: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub total: i64,
}

/// Bulk-insert items for a job, ignoring primary-key duplicates.
///
/// Every inserted row starts `pending` with `attempts = 0`. Returns the
/// number of rows actually inserted, so re-enqueueing the same items
/// reports 0 and leaves the durable state unchanged.
pub async fn enqueue(
    pool: &SqlitePool,
    job_id: Uuid,
    items: &[(String, NaiveDate, NaiveDate)],
) -> Result<u64> {
    if items.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await.context("queue enqueue begin failed")?;
    let now = Utc::now();
    let job_id = job_id.to_string();

    let mut inserted = 0u64;
    for (symbol, window_start, window_end) in items {
        inserted += sqlx::query(
            r#"
            insert or ignore into ingest_queue
              (job_id, symbol, window_start, window_end,
               state, attempts, created_at, last_attempt_at, last_error)
            values (?1, ?2, ?3, ?4, 'pending', 0, ?5, null, null)
            "#,
        )
        .bind(&job_id)
        .bind(symbol.to_ascii_uppercase())
        .bind(window_start)
        .bind(window_end)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("ingest_queue insert failed")?
        .rows_affected();
    }

    tx.commit().await.context("queue enqueue commit failed")?;
    Ok(inserted)
}

/// Claim the next eligible item and mark it `running`.
///
/// Eligible means `state ∈ {pending, failed}` and `attempts < max_attempts`.
/// Select and update run in one transaction so a hypothetical second worker
/// cannot double-dispatch the same row. Returns `None` when the job's queue
/// is drained of eligible items.
pub async fn pop_next(
    pool: &SqlitePool,
    job_id: Uuid,
    max_attempts: i64,
) -> Result<Option<QueueItem>> {
    let mut tx = pool.begin().await.context("queue pop begin failed")?;
    let job_key = job_id.to_string();

    let row = sqlx::query(
        r#"
        select symbol, window_start, window_end, attempts
        from ingest_queue
        where job_id = ?1
          and state in ('pending', 'failed')
          and attempts < ?2
        order by
          case when state = 'pending' then 0 else 1 end,
          attempts asc,
          symbol asc
        limit 1
        "#,
    )
    .bind(&job_key)
    .bind(max_attempts)
    .fetch_optional(&mut *tx)
    .await
    .context("queue pop select failed")?;

    let Some(row) = row else {
        tx.commit().await.context("queue pop commit failed")?;
        return Ok(None);
    };

    let symbol: String = row.try_get("symbol")?;
    let window_start: NaiveDate = row.try_get("window_start")?;
    let window_end: NaiveDate = row.try_get("window_end")?;
    let attempts: i64 = row.try_get("attempts")?;

    sqlx::query(
        r#"
        update ingest_queue
        set state = 'running',
            attempts = ?1,
            last_attempt_at = ?2,
            last_error = null
        where job_id = ?3 and symbol = ?4 and window_start = ?5 and window_end = ?6
        "#,
    )
    .bind(attempts + 1)
    .bind(Utc::now())
    .bind(&job_key)
    .bind(&symbol)
    .bind(window_start)
    .bind(window_end)
    .execute(&mut *tx)
    .await
    .context("queue pop update failed")?;

    tx.commit().await.context("queue pop commit failed")?;

    Ok(Some(QueueItem {
        job_id,
        symbol,
        window_start,
        window_end,
        attempts: attempts + 1,
    }))
}

/// Mark an item terminally succeeded for this attempt.
pub async fn mark_succeeded(pool: &SqlitePool, item: &QueueItem) -> Result<()> {
    sqlx::query(
        r#"
        update ingest_queue
        set state = 'succeeded', last_error = null
        where job_id = ?1 and symbol = ?2 and window_start = ?3 and window_end = ?4
        "#,
    )
    .bind(item.job_id.to_string())
    .bind(&item.symbol)
    .bind(item.window_start)
    .bind(item.window_end)
    .execute(pool)
    .await
    .context("mark_succeeded failed")?;
    Ok(())
}

/// Mark an item failed, recording a truncated error message. The item stays
/// eligible for re-pop until it exhausts `max_attempts`.
pub async fn mark_failed(pool: &SqlitePool, item: &QueueItem, err: &str) -> Result<()> {
    let msg: String = err.chars().take(LAST_ERROR_MAX_CHARS).collect();

    sqlx::query(
        r#"
        update ingest_queue
        set state = 'failed', last_error = ?1
        where job_id = ?2 and symbol = ?3 and window_start = ?4 and window_end = ?5
        "#,
    )
    .bind(msg)
    .bind(item.job_id.to_string())
    .bind(&item.symbol)
    .bind(item.window_start)
    .bind(item.window_end)
    .execute(pool)
    .await
    .context("mark_failed failed")?;
    Ok(())
}

/// Crash recovery: flip orphaned `running` rows back to `pending`.
///
/// A row is considered orphaned when `last_attempt_at` is null or older than
/// `stale_threshold`. Called once at worker startup; `attempts` is preserved
/// so a crashed attempt still counts toward the cap.
pub async fn reset_stale_running(
    pool: &SqlitePool,
    job_id: Uuid,
    stale_threshold: Duration,
) -> Result<u64> {
    let cutoff = Utc::now()
        - chrono::Duration::from_std(stale_threshold).context("stale threshold out of range")?;

    let reset = sqlx::query(
        r#"
        update ingest_queue
        set state = 'pending'
        where job_id = ?1
          and state = 'running'
          and (last_attempt_at is null or last_attempt_at < ?2)
        "#,
    )
    .bind(job_id.to_string())
    .bind(cutoff)
    .execute(pool)
    .await
    .context("reset_stale_running failed")?
    .rows_affected();

    Ok(reset)
}

/// Per-state counts plus total for one job.
pub async fn counts(pool: &SqlitePool, job_id: Uuid) -> Result<QueueCounts> {
    let rows = sqlx::query(
        r#"
        select state, count(*) as n
        from ingest_queue
        where job_id = ?1
        group by state
        "#,
    )
    .bind(job_id.to_string())
    .fetch_all(pool)
    .await
    .context("queue counts failed")?;

    let mut out = QueueCounts::default();
    for row in rows {
        let state: String = row.try_get("state")?;
        let n: i64 = row.try_get("n")?;
        match state.as_str() {
            "pending" => out.pending = n,
            "running" => out.running = n,
            "succeeded" => out.succeeded = n,
            "failed" => out.failed = n,
            _ => {}
        }
        out.total += n;
    }
    Ok(out)
}
