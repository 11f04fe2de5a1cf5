//! EODHD-backed daily OHLCV provider.
//!
//! Endpoint: `GET {base}/api/eod/{SYMBOL}.{EXCHANGE}?from=..&to=..&fmt=json`.
//! The API token is passed in by the caller; it is never logged and the
//! `Debug` impl redacts it.

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::{DailyBar, OhlcvProvider, ProviderError};

/// Concrete [`OhlcvProvider`] against the EODHD REST API.
#[derive(Clone)]
pub struct EodhdProvider {
    api_token: String,
    exchange: String,
    http: reqwest::Client,
    base_url: String,
}

impl std::fmt::Debug for EodhdProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EodhdProvider")
            .field("api_token", &"<REDACTED>")
            .field("exchange", &self.exchange)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl EodhdProvider {
    pub fn new(api_token: String) -> Self {
        Self::new_with_base_url(api_token, "https://eodhd.com".to_string())
    }

    /// Injectable base URL so tests can point at a local mock server.
    pub fn new_with_base_url(api_token: String, base_url: String) -> Self {
        Self {
            api_token,
            exchange: "US".to_string(),
            http: reqwest::Client::new(),
            base_url,
        }
    }

    fn build_eod_url(&self, symbol: &str) -> String {
        format!(
            "{}/api/eod/{}.{}",
            self.base_url.trim_end_matches('/'),
            symbol.to_ascii_uppercase(),
            self.exchange
        )
    }
}

#[async_trait::async_trait]
impl OhlcvProvider for EodhdProvider {
    fn source_name(&self) -> &'static str {
        "eodhd"
    }

    async fn fetch_daily(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, ProviderError> {
        if self.api_token.is_empty() {
            return Err(ProviderError::Config("EODHD api token is empty".into()));
        }

        let (start, end) = clamp_range(start, end, Utc::now().date_naive())?;

        let url = self.build_eod_url(symbol);
        let from_s = start.format("%Y-%m-%d").to_string();
        let to_s = end.format("%Y-%m-%d").to_string();

        let resp = self
            .http
            .get(url)
            .query(&[
                ("from", from_s.as_str()),
                ("to", to_s.as_str()),
                ("fmt", "json"),
                ("api_token", self.api_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(ProviderError::Api {
                code: Some(status.as_u16() as i64),
                message: truncate(&body, 200),
            });
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Decode(format!("eodhd response not json: {e}")))?;

        parse_eod_payload(value)
    }
}

/// Clamp the request so we never fetch past today; `end == today` is allowed.
pub fn clamp_range(
    start: NaiveDate,
    end: NaiveDate,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate), ProviderError> {
    if start > today {
        return Err(ProviderError::InvalidRange(format!(
            "start date {start} is in the future"
        )));
    }
    let end = end.min(today);
    if end < start {
        return Err(ProviderError::InvalidRange(format!(
            "end date {end} is before start date {start}"
        )));
    }
    Ok((start, end))
}

/// Interpret the EODHD payload.
///
/// A JSON array is the normal case; an object with `code`/`message` is the
/// API's in-band error shape. Rows missing any required field are skipped
/// rather than failing the whole window.
pub fn parse_eod_payload(value: Value) -> Result<Vec<DailyBar>, ProviderError> {
    if let Value::Object(map) = &value {
        let code = map.get("code").and_then(Value::as_i64);
        let message = map.get("message").and_then(Value::as_str);
        if code.is_some() || message.is_some() {
            return Err(ProviderError::Api {
                code,
                message: message.unwrap_or("unknown").to_string(),
            });
        }
        return Err(ProviderError::Decode(
            "expected a json array of bars".to_string(),
        ));
    }

    let rows: Vec<EodhdEodRow> = serde_json::from_value(value)
        .map_err(|e| ProviderError::Decode(format!("eodhd row decode failed: {e}")))?;

    let mut bars = Vec::with_capacity(rows.len());
    for row in rows {
        let (Some(date_s), Some(open), Some(high), Some(low), Some(close), Some(volume)) =
            (row.date, row.open, row.high, row.low, row.close, row.volume)
        else {
            continue;
        };
        let Ok(trade_date) = NaiveDate::parse_from_str(&date_s, "%Y-%m-%d") else {
            continue;
        };

        bars.push(DailyBar {
            trade_date,
            open,
            high,
            low,
            close,
            volume,
            vwap: row.vwap,
            turnover: row.turnover,
            // EODHD reports percentage change as change_p; older payloads use change.
            change_pct: row.change_p.or(row.change),
            adj_open: row.adjusted_open,
            adj_high: row.adjusted_high,
            adj_low: row.adjusted_low,
            adj_close: row.adjusted_close.or(row.adj_close),
        });
    }

    Ok(bars)
}

#[derive(Debug, Deserialize)]
struct EodhdEodRow {
    date: Option<String>,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
    vwap: Option<f64>,
    turnover: Option<f64>,
    change_p: Option<f64>,
    change: Option<f64>,
    adjusted_open: Option<f64>,
    adjusted_high: Option<f64>,
    adjusted_low: Option<f64>,
    adjusted_close: Option<f64>,
    adj_close: Option<f64>,
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

// -----------------
// Tests
// -----------------
