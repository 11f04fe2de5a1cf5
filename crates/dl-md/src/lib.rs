//! dl-md
//!
//! Vendor boundary for daily OHLCV market data.
//!
//! This crate owns the bar record type, the provider trait, and the concrete
//! EODHD-backed provider. It does **not** write to the DB; callers fetch bars
//! and hand them to the dl-db bar store.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub mod eodhd;

pub use eodhd::EodhdProvider;

// ---------------------------------------------------------------------------
// Daily bar
// ---------------------------------------------------------------------------

/// One end-of-day OHLCV bar for a symbol.
///
/// Required fields are always present; the optional adjusted/derived fields
/// are carried only when the vendor supplies them. This is a fixed record on
/// purpose: free-form maps do not cross component boundaries here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub trade_date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vwap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turnover: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adj_open: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adj_high: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adj_low: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adj_close: Option<f64>,
}

impl DailyBar {
    /// OHLC sanity: `high ≥ max(open,close) ≥ min(open,close) ≥ low ≥ 0`
    /// and `volume ≥ 0`.
    pub fn is_sane(&self) -> bool {
        if self.low < 0.0 || self.volume < 0.0 {
            return false;
        }
        let max_oc = self.open.max(self.close);
        let min_oc = self.open.min(self.close);
        self.high >= max_oc && min_oc >= self.low
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that an [`OhlcvProvider`] implementation may return.
#[derive(Debug)]
pub enum ProviderError {
    /// Network or transport failure.
    Transport(String),
    /// The upstream API returned an application-level error.
    Api { code: Option<i64>, message: String },
    /// A response payload could not be decoded.
    Decode(String),
    /// The requested date range is unusable (e.g. starts in the future).
    InvalidRange(String),
    /// A required configuration value (e.g. API token) is missing or invalid.
    Config(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Transport(msg) => write!(f, "transport error: {msg}"),
            ProviderError::Api {
                code: Some(c),
                message,
            } => write!(f, "vendor api error code={c}: {message}"),
            ProviderError::Api {
                code: None,
                message,
            } => write!(f, "vendor api error: {message}"),
            ProviderError::Decode(msg) => write!(f, "decode error: {msg}"),
            ProviderError::InvalidRange(msg) => write!(f, "invalid range: {msg}"),
            ProviderError::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for ProviderError {}

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

/// Upstream daily-OHLCV provider contract.
///
/// Implementations must be object-safe (`Box<dyn OhlcvProvider>`) and
/// `Send + Sync` so the worker can hold one across task boundaries.
///
/// Fetches must be idempotent: the scheduler retries failed items, and the
/// same `(symbol, start, end)` request may be issued several times.
/// An empty result is legal (holiday or weekend-only windows).
#[async_trait::async_trait]
pub trait OhlcvProvider: Send + Sync {
    /// Human-readable source name (e.g. `"eodhd"`).
    fn source_name(&self) -> &'static str;

    /// Fetch daily bars for `symbol` in `[start, end]`, both inclusive.
    async fn fetch_daily(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, ProviderError>;
}
