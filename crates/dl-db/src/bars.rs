//! Daily-bar store: write-through cache of vendor OHLCV keyed by
//! `(symbol, trade_date)`, plus the tiered-storage archive step.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::{Row, SqlitePool};

use dl_md::DailyBar;

/// Outcome of one batch upsert.
///
/// `rejected` counts bars that failed OHLC/volume sanity and were skipped;
/// a bad vendor row must not poison the rest of its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarUpsertOutcome {
    pub written: u64,
    pub rejected: u64,
}

/// Outcome of [`archive_before`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ArchiveOutcome {
    pub archived: u64,
    pub deleted_from_live: u64,
}

/// Upsert a batch of daily bars for one symbol inside a single transaction.
///
/// Replaces any existing row with the same `(symbol, trade_date)`. Empty
/// input is a no-op. On any DB error the transaction rolls back and nothing
/// is visible. Symbols are normalized uppercase on write.
pub async fn upsert_daily_bars(
    pool: &SqlitePool,
    symbol: &str,
    bars: &[DailyBar],
) -> Result<BarUpsertOutcome> {
    if bars.is_empty() {
        return Ok(BarUpsertOutcome {
            written: 0,
            rejected: 0,
        });
    }

    let symbol = symbol.to_ascii_uppercase();
    let mut tx = pool.begin().await.context("bar upsert begin failed")?;

    let mut written = 0u64;
    let mut rejected = 0u64;

    for bar in bars {
        if !bar.is_sane() {
            rejected += 1;
            continue;
        }

        sqlx::query(
            r#"
            insert into daily_bars (
              symbol, trade_date, open, high, low, close, volume,
              vwap, turnover, change_pct, adj_open, adj_high, adj_low, adj_close
            )
            values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            on conflict (symbol, trade_date) do update
              set open       = excluded.open,
                  high       = excluded.high,
                  low        = excluded.low,
                  close      = excluded.close,
                  volume     = excluded.volume,
                  vwap       = excluded.vwap,
                  turnover   = excluded.turnover,
                  change_pct = excluded.change_pct,
                  adj_open   = excluded.adj_open,
                  adj_high   = excluded.adj_high,
                  adj_low    = excluded.adj_low,
                  adj_close  = excluded.adj_close
            "#,
        )
        .bind(&symbol)
        .bind(bar.trade_date)
        .bind(bar.open)
        .bind(bar.high)
        .bind(bar.low)
        .bind(bar.close)
        .bind(bar.volume)
        .bind(bar.vwap)
        .bind(bar.turnover)
        .bind(bar.change_pct)
        .bind(bar.adj_open)
        .bind(bar.adj_high)
        .bind(bar.adj_low)
        .bind(bar.adj_close)
        .execute(&mut *tx)
        .await
        .context("daily_bars upsert failed")?;

        written += 1;
    }

    tx.commit().await.context("bar upsert commit failed")?;

    Ok(BarUpsertOutcome { written, rejected })
}

/// Read bars for `symbol` in `[start, end]` inclusive, ascending by date.
pub async fn read_daily_bars(
    pool: &SqlitePool,
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<DailyBar>> {
    let symbol = symbol.to_ascii_uppercase();

    let rows = sqlx::query(
        r#"
        select trade_date, open, high, low, close, volume,
               vwap, turnover, change_pct, adj_open, adj_high, adj_low, adj_close
        from daily_bars
        where symbol = ?1
          and trade_date between ?2 and ?3
        order by trade_date asc
        "#,
    )
    .bind(&symbol)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await
    .context("read_daily_bars failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(DailyBar {
            trade_date: row.try_get("trade_date")?,
            open: row.try_get("open")?,
            high: row.try_get("high")?,
            low: row.try_get("low")?,
            close: row.try_get("close")?,
            volume: row.try_get("volume")?,
            vwap: row.try_get("vwap")?,
            turnover: row.try_get("turnover")?,
            change_pct: row.try_get("change_pct")?,
            adj_open: row.try_get("adj_open")?,
            adj_high: row.try_get("adj_high")?,
            adj_low: row.try_get("adj_low")?,
            adj_close: row.try_get("adj_close")?,
        });
    }
    Ok(out)
}

/// Move bars older than `cutoff` into the archive twin table, then delete
/// them from the live table, in one transaction. Idempotent across re-runs.
///
/// Rows with `trade_date >= cutoff` are untouched. Re-archiving a date that
/// already exists in the archive overwrites it (upsert), so a crash between
/// copy and delete is repaired by simply running the step again.
pub async fn archive_before(pool: &SqlitePool, cutoff: NaiveDate) -> Result<ArchiveOutcome> {
    let mut tx = pool.begin().await.context("archive begin failed")?;

    let copied = sqlx::query(
        r#"
        insert into daily_bars_archive (
          symbol, trade_date, open, high, low, close, volume,
          vwap, turnover, change_pct, adj_open, adj_high, adj_low, adj_close
        )
        select symbol, trade_date, open, high, low, close, volume,
               vwap, turnover, change_pct, adj_open, adj_high, adj_low, adj_close
        from daily_bars
        where trade_date < ?1
        on conflict (symbol, trade_date) do update
          set open       = excluded.open,
              high       = excluded.high,
              low        = excluded.low,
              close      = excluded.close,
              volume     = excluded.volume,
              vwap       = excluded.vwap,
              turnover   = excluded.turnover,
              change_pct = excluded.change_pct,
              adj_open   = excluded.adj_open,
              adj_high   = excluded.adj_high,
              adj_low    = excluded.adj_low,
              adj_close  = excluded.adj_close
        "#,
    )
    .bind(cutoff)
    .execute(&mut *tx)
    .await
    .context("archive copy failed")?
    .rows_affected();

    let deleted = sqlx::query("delete from daily_bars where trade_date < ?1")
        .bind(cutoff)
        .execute(&mut *tx)
        .await
        .context("archive delete failed")?
        .rows_affected();

    tx.commit().await.context("archive commit failed")?;

    Ok(ArchiveOutcome {
        archived: copied,
        deleted_from_live: deleted,
    })
}
