//! The per-job worker loop: crash recovery, counter reconciliation, queue
//! drain, finalization, and the optional post-ingest archive step.
//!
//! Exactly one worker runs per job id (enforced by the caller's registry).
//! Items are processed sequentially; the only long suspension point is the
//! vendor fetch, which runs under `vendor_timeout` and races the
//! cancellation token. Every store write is a short transaction, so a hard
//! kill leaves at most one `running` row for the next start to reclaim.

use chrono::{Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use dl_db::{bars, jobs, queue, JobProgress, JobState, QueueItem};

use crate::error::IngestError;
use crate::IngestDeps;

/// Post-ingest archive request, carried in memory from start to finish.
#[derive(Debug, Clone, Copy)]
pub struct ArchivePolicy {
    pub keep_days: i64,
}

/// Drive the job with id `job_id` until its queue is drained, the token is
/// cancelled, or a store failure forces an exit.
///
/// Safe to re-invoke for the same job id at any time (that is what resume
/// is): stale `running` rows are reclaimed first, counters are re-derived
/// from queue truth, and items that already succeeded are never popped
/// again.
pub async fn run_worker(
    deps: &IngestDeps,
    job_id: Uuid,
    archive: Option<ArchivePolicy>,
    cancel: CancellationToken,
) -> Result<(), IngestError> {
    // 1. Crash recovery: reclaim rows orphaned by a previous process.
    let reclaimed =
        queue::reset_stale_running(&deps.pool, job_id, deps.config.stale_threshold).await?;
    if reclaimed > 0 {
        info!(%job_id, reclaimed, "reset stale running items to pending");
    }

    // 2. Reconciliation: job counters are a projection of queue truth, even
    //    if progress writes from a previous run were lost.
    let job = jobs::get(&deps.pool, job_id)
        .await?
        .ok_or(IngestError::JobNotFound(job_id))?;
    let counts = queue::counts(&deps.pool, job_id).await?;

    let mut succeeded = counts.succeeded;
    let mut failed = counts.failed;

    jobs::update_progress(
        &deps.pool,
        job_id,
        &JobProgress {
            state: JobState::Running,
            attempted: succeeded + failed,
            succeeded,
            failed,
            last_error: job.last_error,
        },
    )
    .await?;

    // 3. Drain.
    loop {
        if cancel.is_cancelled() {
            info!(%job_id, "worker cancelled; leaving job resumable");
            break;
        }

        let Some(item) = queue::pop_next(&deps.pool, job_id, deps.config.max_attempts).await?
        else {
            break;
        };

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                // The in-flight row stays `running`; the next start's stale
                // reset reclaims it with its attempt count intact.
                info!(%job_id, symbol = %item.symbol, "worker cancelled mid-fetch");
                break;
            }
            outcome = execute_item(deps, &item) => outcome,
        };

        match outcome {
            Ok(written) => {
                queue::mark_succeeded(&deps.pool, &item).await?;
                succeeded += 1;
                info!(
                    %job_id,
                    symbol = %item.symbol,
                    window_start = %item.window_start,
                    window_end = %item.window_end,
                    bars_written = written,
                    "item succeeded"
                );
            }
            Err(reason) => {
                queue::mark_failed(&deps.pool, &item, &reason).await?;
                failed += 1;
                warn!(
                    %job_id,
                    symbol = %item.symbol,
                    window_start = %item.window_start,
                    attempt = item.attempts,
                    %reason,
                    "item failed"
                );
            }
        }

        jobs::update_progress(
            &deps.pool,
            job_id,
            &JobProgress {
                state: JobState::Running,
                attempted: succeeded + failed,
                succeeded,
                failed,
                last_error: None,
            },
        )
        .await?;
    }

    // 4. Finalization, from queue truth rather than local tallies.
    let final_counts = queue::counts(&deps.pool, job_id).await?;

    if final_counts.pending > 0 || final_counts.running > 0 {
        jobs::update_progress(
            &deps.pool,
            job_id,
            &JobProgress {
                state: JobState::Running,
                attempted: final_counts.succeeded + final_counts.failed,
                succeeded: final_counts.succeeded,
                failed: final_counts.failed,
                last_error: Some("paused with remaining items".to_string()),
            },
        )
        .await?;
        info!(
            %job_id,
            pending = final_counts.pending,
            running = final_counts.running,
            "worker exiting with remaining items; job stays resumable"
        );
        return Ok(());
    }

    let (state, last_error) = if final_counts.failed == 0 {
        (JobState::Succeeded, None)
    } else {
        (
            JobState::Failed,
            Some(format!(
                "{} items failed after exhausting retries",
                final_counts.failed
            )),
        )
    };

    jobs::finalize(
        &deps.pool,
        job_id,
        &JobProgress {
            state,
            attempted: final_counts.succeeded + final_counts.failed,
            succeeded: final_counts.succeeded,
            failed: final_counts.failed,
            last_error,
        },
    )
    .await?;

    info!(
        %job_id,
        state = state.as_str(),
        succeeded = final_counts.succeeded,
        failed = final_counts.failed,
        "ingest job finalized"
    );

    // 5. Optional archive, best-effort: an archive failure never taints a
    //    finished ingest.
    if let Some(policy) = archive {
        if policy.keep_days >= deps.config.min_archive_keep_days {
            let cutoff = Utc::now().date_naive() - Duration::days(policy.keep_days);
            match bars::archive_before(&deps.pool, cutoff).await {
                Ok(outcome) => info!(
                    %job_id,
                    %cutoff,
                    archived = outcome.archived,
                    deleted_from_live = outcome.deleted_from_live,
                    "post-ingest archive complete"
                ),
                Err(err) => warn!(%job_id, error = %format!("{err:#}"), "post-ingest archive failed"),
            }
        } else {
            warn!(
                %job_id,
                keep_days = policy.keep_days,
                floor = deps.config.min_archive_keep_days,
                "archive_keep_days below floor; skipping post-ingest archive"
            );
        }
    }

    Ok(())
}

/// Run one work item to an explicit outcome: bars written, or a stringified
/// reason that drives the queue state machine. Item failures are data, not
/// control flow.
async fn execute_item(deps: &IngestDeps, item: &QueueItem) -> Result<u64, String> {
    let fetched = tokio::time::timeout(
        deps.config.vendor_timeout,
        deps.provider
            .fetch_daily(&item.symbol, item.window_start, item.window_end),
    )
    .await;

    let bars = match fetched {
        Err(_) => {
            return Err(format!(
                "vendor fetch timed out after {}s",
                deps.config.vendor_timeout.as_secs()
            ))
        }
        Ok(Err(err)) => return Err(err.to_string()),
        Ok(Ok(bars)) => bars,
    };

    match bars::upsert_daily_bars(&deps.pool, &item.symbol, &bars).await {
        Ok(outcome) => Ok(outcome.written),
        Err(err) => Err(format!("bar store write failed: {err:#}")),
    }
}
