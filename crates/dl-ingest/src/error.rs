//! Error taxonomy for the ingest command surface.
//!
//! Input errors surface synchronously and never create a job; store errors
//! terminate the current worker task without tainting durable state.

use std::fmt;

use chrono::NaiveDate;
use uuid::Uuid;

#[derive(Debug)]
pub enum IngestError {
    /// `requested_start > requested_end`.
    BadRange { start: NaiveDate, end: NaiveDate },
    /// `window_days < 1`.
    BadWindow { window_days: i64 },
    /// Other invalid caller input (e.g. archive keep_days below the floor).
    BadInput(String),
    /// The universe filters matched no symbols.
    NoUniverseMatch,
    /// Unknown job id on resume/progress.
    JobNotFound(Uuid),
    /// The queue/job/bar store itself failed.
    Store(anyhow::Error),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::BadRange { start, end } => {
                write!(f, "start date {start} must be <= end date {end}")
            }
            IngestError::BadWindow { window_days } => {
                write!(f, "window_days must be >= 1, got {window_days}")
            }
            IngestError::BadInput(msg) => write!(f, "{msg}"),
            IngestError::NoUniverseMatch => write!(
                f,
                "no symbols matched the universe filters; \
                 refresh the symbol universe or loosen the filters"
            ),
            IngestError::JobNotFound(job_id) => write!(f, "no ingest job with id {job_id}"),
            IngestError::Store(err) => write!(f, "store failure: {err:#}"),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::Store(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for IngestError {
    fn from(err: anyhow::Error) -> Self {
        IngestError::Store(err)
    }
}
