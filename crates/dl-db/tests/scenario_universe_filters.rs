//! Universe store: filter semantics, NULL handling, ordering, and the
//! max-symbols ceiling for `select_symbols`.

use chrono::Utc;
use sqlx::SqlitePool;

use dl_db::universe::{self, UniverseFilters, UniverseRow};

async fn open_temp_store() -> (tempfile::TempDir, SqlitePool) {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = dl_db::open_store(&dir.path().join("test.sqlite"))
        .await
        .expect("open store");
    (dir, pool)
}

fn row(symbol: &str, exchange: &str, market_cap: Option<f64>) -> UniverseRow {
    UniverseRow {
        symbol: symbol.to_string(),
        name: format!("{symbol} Inc"),
        exchange: exchange.to_string(),
        sector: Some("Technology".to_string()),
        industry: None,
        market_cap,
        price: Some(100.0),
        is_etf: Some(false),
        is_fund: Some(false),
        is_actively_trading: Some(true),
        updated_at: Utc::now(),
    }
}

fn filters() -> UniverseFilters {
    UniverseFilters {
        min_market_cap: 50_000_000.0,
        max_market_cap: None,
        exchanges: vec!["NYSE".to_string(), "NASDAQ".to_string()],
        include_etfs: false,
        active_only: true,
        max_symbols: 500,
    }
}

#[tokio::test]
async fn orders_by_market_cap_desc_then_symbol_asc() {
    let (_dir, pool) = open_temp_store().await;

    universe::upsert_universe(
        &pool,
        &[
            row("SMALL", "NYSE", Some(60_000_000.0)),
            row("BIG", "NYSE", Some(5_000_000_000.0)),
            row("TIE2", "NYSE", Some(1_000_000_000.0)),
            row("TIE1", "NYSE", Some(1_000_000_000.0)),
        ],
    )
    .await
    .unwrap();

    let symbols = universe::select_symbols(&pool, &filters()).await.unwrap();
    assert_eq!(symbols, vec!["BIG", "TIE1", "TIE2", "SMALL"]);
}

#[tokio::test]
async fn cap_bounds_and_null_caps_filter_out() {
    let (_dir, pool) = open_temp_store().await;

    universe::upsert_universe(
        &pool,
        &[
            row("NOCAP", "NYSE", None),
            row("TINY", "NYSE", Some(10_000_000.0)),
            row("MID", "NYSE", Some(2_000_000_000.0)),
            row("HUGE", "NYSE", Some(3_000_000_000_000.0)),
        ],
    )
    .await
    .unwrap();

    let mut f = filters();
    f.max_market_cap = Some(10_000_000_000.0);
    let symbols = universe::select_symbols(&pool, &f).await.unwrap();
    assert_eq!(symbols, vec!["MID"]);
}

#[tokio::test]
async fn funds_always_excluded_etfs_opt_in() {
    let (_dir, pool) = open_temp_store().await;

    let mut etf = row("SPYX", "NYSE", Some(400_000_000_000.0));
    etf.is_etf = Some(true);
    let mut fund = row("FNDX", "NYSE", Some(90_000_000_000.0));
    fund.is_fund = Some(true);
    // NULL flags are treated as not-ETF / not-fund.
    let mut null_flags = row("NULL", "NYSE", Some(80_000_000_000.0));
    null_flags.is_etf = None;
    null_flags.is_fund = None;

    universe::upsert_universe(
        &pool,
        &[etf, fund, null_flags, row("PLAIN", "NYSE", Some(70_000_000_000.0))],
    )
    .await
    .unwrap();

    let excluded = universe::select_symbols(&pool, &filters()).await.unwrap();
    assert_eq!(excluded, vec!["NULL", "PLAIN"]);

    let mut f = filters();
    f.include_etfs = true;
    let included = universe::select_symbols(&pool, &f).await.unwrap();
    assert_eq!(included, vec!["SPYX", "NULL", "PLAIN"]);
}

#[tokio::test]
async fn exchange_and_active_filters_apply() {
    let (_dir, pool) = open_temp_store().await;

    let mut inactive = row("DEAD", "NYSE", Some(2_000_000_000.0));
    inactive.is_actively_trading = Some(false);
    let mut unknown_active = row("MAYB", "NYSE", Some(3_000_000_000.0));
    unknown_active.is_actively_trading = None;

    universe::upsert_universe(
        &pool,
        &[
            inactive,
            unknown_active,
            row("OTC1", "OTC", Some(4_000_000_000.0)),
            row("LIVE", "NASDAQ", Some(1_000_000_000.0)),
        ],
    )
    .await
    .unwrap();

    let symbols = universe::select_symbols(&pool, &filters()).await.unwrap();
    assert_eq!(symbols, vec!["LIVE"]);

    // active_only off: NULL activity no longer disqualifies.
    let mut f = filters();
    f.active_only = false;
    let relaxed = universe::select_symbols(&pool, &f).await.unwrap();
    assert_eq!(relaxed, vec!["MAYB", "DEAD", "LIVE"]);
}

#[tokio::test]
async fn max_symbols_caps_the_result() {
    let (_dir, pool) = open_temp_store().await;

    let rows: Vec<UniverseRow> = (0..10)
        .map(|i| {
            row(
                &format!("SYM{i}"),
                "NYSE",
                Some(1_000_000_000.0 * (10 - i) as f64),
            )
        })
        .collect();
    universe::upsert_universe(&pool, &rows).await.unwrap();

    let mut f = filters();
    f.max_symbols = 3;
    let symbols = universe::select_symbols(&pool, &f).await.unwrap();
    assert_eq!(symbols, vec!["SYM0", "SYM1", "SYM2"]);
}

#[tokio::test]
async fn empty_match_is_legal() {
    let (_dir, pool) = open_temp_store().await;
    let symbols = universe::select_symbols(&pool, &filters()).await.unwrap();
    assert!(symbols.is_empty());
}

#[tokio::test]
async fn upsert_replaces_by_symbol() {
    let (_dir, pool) = open_temp_store().await;

    universe::upsert_universe(&pool, &[row("AAPL", "NASDAQ", Some(1.0e12))])
        .await
        .unwrap();
    universe::upsert_universe(&pool, &[row("aapl", "NASDAQ", Some(2.0e12))])
        .await
        .unwrap();

    let (count, cap): (i64, f64) =
        sqlx::query_as("select count(*), max(market_cap) from symbol_universe")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(count, 1);
    assert_eq!(cap, 2.0e12);
}
