//! Axum router and all HTTP handlers for dl-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use dl_db::{jobs, UniverseFilters};
use dl_ingest::{
    archive_with_keep_days, progress, resume, start_resumable, IngestError, IngestRequest,
};

use crate::api_types::{
    ArchiveRequest, ArchiveResponse, ErrorResponse, HealthResponse, LatestJobResponse,
    ProgressResponse, ResumeResponse, StartResumableRequest, StartResumableResponse,
};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/ingest/start-resumable", post(ingest_start_resumable))
        .route("/v1/ingest/jobs/:job_id/resume", post(ingest_resume))
        .route("/v1/ingest/jobs/:job_id/progress", get(ingest_progress))
        .route("/v1/ingest/jobs/latest", get(ingest_latest_job))
        .route("/v1/bars/archive", post(bars_archive))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn error_response(err: IngestError) -> Response {
    let status = match &err {
        IngestError::BadRange { .. }
        | IngestError::BadWindow { .. }
        | IngestError::BadInput(_)
        | IngestError::NoUniverseMatch => StatusCode::BAD_REQUEST,
        IngestError::JobNotFound(_) => StatusCode::NOT_FOUND,
        IngestError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %err, "request failed with store error");
    }

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/ingest/start-resumable
// ---------------------------------------------------------------------------

/// Validate and expand a bulk-ingest request, then launch its worker.
///
/// The request returns as soon as the job is created and its items are
/// enqueued; progress is observable via the progress route.
pub(crate) async fn ingest_start_resumable(
    State(st): State<Arc<AppState>>,
    Json(body): Json<StartResumableRequest>,
) -> Response {
    let window_days = body
        .window_days
        .unwrap_or(st.deps.config.default_window_days);

    let req = IngestRequest {
        start: body.start,
        end: body.end,
        window_days,
        filters: UniverseFilters {
            min_market_cap: body.min_market_cap,
            max_market_cap: body.max_market_cap,
            exchanges: body.exchanges,
            include_etfs: body.include_etfs,
            active_only: body.active_only,
            max_symbols: body.max_symbols,
        },
        archive_on_finish: body.archive_on_finish,
        archive_keep_days: body.archive_keep_days,
    };

    let started = match start_resumable(&st.deps, &req).await {
        Ok(started) => started,
        Err(err) => return error_response(err),
    };

    st.spawn_worker(started.job_id, started.archive).await;

    (
        StatusCode::OK,
        Json(StartResumableResponse {
            job_id: started.job_id,
            requested_start: started.requested_start,
            requested_end: started.requested_end,
            window_days: started.window_days,
            queued_items: started.queued_items,
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// POST /v1/ingest/jobs/{job_id}/resume
// ---------------------------------------------------------------------------

/// Re-enter the worker loop for an existing job.
///
/// Idempotent: resuming a finished job drains nothing, and resuming a job
/// whose worker is still live does not spawn a second worker.
pub(crate) async fn ingest_resume(
    State(st): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Response {
    let job = match resume(&st.deps, job_id).await {
        Ok(job) => job,
        Err(err) => return error_response(err),
    };

    st.spawn_worker(job.id, None).await;

    (
        StatusCode::OK,
        Json(ResumeResponse {
            ok: true,
            job_id: job.id,
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/ingest/jobs/{job_id}/progress
// ---------------------------------------------------------------------------

pub(crate) async fn ingest_progress(
    State(st): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Response {
    match progress(&st.deps, job_id).await {
        Ok(report) => (
            StatusCode::OK,
            Json(ProgressResponse {
                job_id: report.job.id,
                state: report.job.state,
                counts: report.counts,
                pct_complete: report.pct_complete,
            }),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/ingest/jobs/latest
// ---------------------------------------------------------------------------

pub(crate) async fn ingest_latest_job(State(st): State<Arc<AppState>>) -> Response {
    match jobs::get_latest(&st.deps.pool).await {
        Ok(Some(job)) => (StatusCode::OK, Json(LatestJobResponse { job })).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "no ingest jobs found".to_string(),
            }),
        )
            .into_response(),
        Err(err) => error_response(IngestError::Store(err)),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/bars/archive
// ---------------------------------------------------------------------------

pub(crate) async fn bars_archive(
    State(st): State<Arc<AppState>>,
    Json(body): Json<ArchiveRequest>,
) -> Response {
    match archive_with_keep_days(&st.deps, body.keep_days).await {
        Ok(report) => (
            StatusCode::OK,
            Json(ArchiveResponse {
                cutoff_date: report.cutoff_date,
                archived: report.archived,
                deleted_from_live: report.deleted_from_live,
            }),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}
