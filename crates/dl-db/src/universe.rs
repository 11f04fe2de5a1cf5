//! Symbol-universe store.
//!
//! The table is populated wholesale by the external universe refresher;
//! the scheduler only reads it through [`select_symbols`].

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

/// One row of the stored symbol universe.
#[derive(Debug, Clone, PartialEq)]
pub struct UniverseRow {
    pub symbol: String,
    pub name: String,
    pub exchange: String,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub market_cap: Option<f64>,
    pub price: Option<f64>,
    pub is_etf: Option<bool>,
    pub is_fund: Option<bool>,
    pub is_actively_trading: Option<bool>,
    pub updated_at: DateTime<Utc>,
}

/// Universe filters used by the scheduler when expanding a request.
#[derive(Debug, Clone)]
pub struct UniverseFilters {
    pub min_market_cap: f64,
    pub max_market_cap: Option<f64>,
    pub exchanges: Vec<String>,
    pub include_etfs: bool,
    pub active_only: bool,
    pub max_symbols: i64,
}

/// Replace-by-PK write used by the universe refresher and by tests.
///
/// Transactional; newer rows overwrite old ones. Symbols are normalized
/// uppercase. Returns the number of rows written.
pub async fn upsert_universe(pool: &SqlitePool, rows: &[UniverseRow]) -> Result<u64> {
    if rows.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await.context("universe upsert begin failed")?;

    for row in rows {
        sqlx::query(
            r#"
            insert into symbol_universe (
              symbol, name, exchange, sector, industry,
              market_cap, price, is_etf, is_fund, is_actively_trading, updated_at
            )
            values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            on conflict (symbol) do update
              set name                = excluded.name,
                  exchange            = excluded.exchange,
                  sector              = excluded.sector,
                  industry            = excluded.industry,
                  market_cap          = excluded.market_cap,
                  price               = excluded.price,
                  is_etf              = excluded.is_etf,
                  is_fund             = excluded.is_fund,
                  is_actively_trading = excluded.is_actively_trading,
                  updated_at          = excluded.updated_at
            "#,
        )
        .bind(row.symbol.to_ascii_uppercase())
        .bind(&row.name)
        .bind(&row.exchange)
        .bind(&row.sector)
        .bind(&row.industry)
        .bind(row.market_cap)
        .bind(row.price)
        .bind(row.is_etf)
        .bind(row.is_fund)
        .bind(row.is_actively_trading)
        .bind(row.updated_at)
        .execute(&mut *tx)
        .await
        .context("symbol_universe upsert failed")?;
    }

    tx.commit().await.context("universe upsert commit failed")?;
    Ok(rows.len() as u64)
}

/// Select candidate symbols for ingestion, market-cap descending then
/// symbol ascending, capped at `max_symbols`.
///
/// Filter semantics (NULLs treated as false where noted):
/// - exchange membership when `exchanges` is non-empty
/// - `market_cap` non-null and within `[min_market_cap, max_market_cap]`
/// - funds are always excluded (NULL = not a fund)
/// - ETFs excluded unless `include_etfs` (NULL = not an ETF)
/// - `is_actively_trading = true` required when `active_only`
pub async fn select_symbols(pool: &SqlitePool, filters: &UniverseFilters) -> Result<Vec<String>> {
    let mut clauses: Vec<String> = Vec::new();

    if !filters.exchanges.is_empty() {
        let placeholders = vec!["?"; filters.exchanges.len()].join(", ");
        clauses.push(format!("exchange in ({placeholders})"));
    }

    clauses.push("(is_fund is null or is_fund = 0)".to_string());
    clauses.push("market_cap is not null".to_string());
    clauses.push("market_cap >= ?".to_string());

    if filters.max_market_cap.is_some() {
        clauses.push("market_cap <= ?".to_string());
    }
    if !filters.include_etfs {
        clauses.push("(is_etf is null or is_etf = 0)".to_string());
    }
    if filters.active_only {
        clauses.push("is_actively_trading = 1".to_string());
    }

    let sql = format!(
        "select symbol from symbol_universe where {} \
         order by market_cap desc, symbol asc limit ?",
        clauses.join(" and ")
    );

    let mut query = sqlx::query(&sql);
    for exchange in &filters.exchanges {
        query = query.bind(exchange.to_ascii_uppercase());
    }
    query = query.bind(filters.min_market_cap);
    if let Some(max_cap) = filters.max_market_cap {
        query = query.bind(max_cap);
    }
    query = query.bind(filters.max_symbols);

    let rows = query
        .fetch_all(pool)
        .await
        .context("select_symbols failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(row.try_get::<String, _>("symbol")?);
    }
    Ok(out)
}
