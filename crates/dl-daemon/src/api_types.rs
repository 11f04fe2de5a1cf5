//! Request/response payloads for the daemon's command surface.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dl_db::{JobRecord, JobState, QueueCounts};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

/// Body of `POST /v1/ingest/start-resumable`.
///
/// Filter defaults mirror the operational sweet spot: NYSE/NASDAQ equities
/// above a $50M cap floor, actively trading, no ETFs or funds, capped at
/// 500 symbols so a loose filter cannot fan out to the whole market.
#[derive(Debug, Deserialize)]
pub struct StartResumableRequest {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Defaults to the configured `default_window_days` when absent.
    pub window_days: Option<i64>,

    #[serde(default = "default_min_market_cap")]
    pub min_market_cap: f64,
    pub max_market_cap: Option<f64>,
    #[serde(default = "default_exchanges")]
    pub exchanges: Vec<String>,
    #[serde(default)]
    pub include_etfs: bool,
    #[serde(default = "default_true")]
    pub active_only: bool,
    #[serde(default = "default_max_symbols")]
    pub max_symbols: i64,

    #[serde(default)]
    pub archive_on_finish: bool,
    pub archive_keep_days: Option<i64>,
}

fn default_min_market_cap() -> f64 {
    50_000_000.0
}

fn default_exchanges() -> Vec<String> {
    vec!["NYSE".to_string(), "NASDAQ".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_max_symbols() -> i64 {
    500
}

#[derive(Debug, Serialize)]
pub struct StartResumableResponse {
    pub job_id: Uuid,
    pub requested_start: NaiveDate,
    pub requested_end: NaiveDate,
    pub window_days: i64,
    pub queued_items: u64,
}

#[derive(Debug, Serialize)]
pub struct ResumeResponse {
    pub ok: bool,
    pub job_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub job_id: Uuid,
    pub state: JobState,
    pub counts: QueueCounts,
    pub pct_complete: f64,
}

/// `GET /v1/ingest/jobs/latest` returns the job record as stored.
#[derive(Debug, Serialize)]
pub struct LatestJobResponse {
    #[serde(flatten)]
    pub job: JobRecord,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveRequest {
    pub keep_days: i64,
}

#[derive(Debug, Serialize)]
pub struct ArchiveResponse {
    pub cutoff_date: NaiveDate,
    pub archived: u64,
    pub deleted_from_live: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
