//! Resume idempotence: re-entering the worker loop for a finished job pops
//! nothing, writes no duplicate bars, and leaves the record unchanged.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveDate, Utc};
use tokio_util::sync::CancellationToken;

use dl_config::IngestConfig;
use dl_db::{bars, jobs, universe, JobState, UniverseFilters, UniverseRow};
use dl_ingest::{resume, run_worker, start_resumable, IngestDeps, IngestRequest};
use dl_md::{DailyBar, OhlcvProvider, ProviderError};

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// Counts fetches so the test can prove resume never re-fetched.
struct CountingProvider {
    calls: AtomicU64,
}

#[async_trait::async_trait]
impl OhlcvProvider for CountingProvider {
    fn source_name(&self) -> &'static str {
        "mock-counting"
    }

    async fn fetch_daily(
        &self,
        _symbol: &str,
        start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<DailyBar>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((0..10)
            .map(|i| DailyBar {
                trade_date: start + Duration::days(i),
                open: 10.0,
                high: 11.0,
                low: 9.0,
                close: 10.5,
                volume: 1_000.0,
                vwap: None,
                turnover: None,
                change_pct: None,
                adj_open: None,
                adj_high: None,
                adj_low: None,
                adj_close: None,
            })
            .collect())
    }
}

#[tokio::test]
async fn resuming_a_finished_job_changes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = dl_db::open_store(&dir.path().join("test.sqlite"))
        .await
        .expect("open store");
    let provider = Arc::new(CountingProvider {
        calls: AtomicU64::new(0),
    });
    let deps = IngestDeps {
        pool,
        provider: Arc::clone(&provider) as Arc<dyn OhlcvProvider>,
        config: IngestConfig {
            data_dir: dir.path().to_path_buf(),
            max_attempts: 5,
            stale_threshold: StdDuration::from_secs(600),
            vendor_timeout: StdDuration::from_secs(5),
            default_window_days: 365,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            min_archive_keep_days: 30,
        },
    };

    universe::upsert_universe(
        &deps.pool,
        &[UniverseRow {
            symbol: "AAA".to_string(),
            name: "AAA Inc".to_string(),
            exchange: "NYSE".to_string(),
            sector: None,
            industry: None,
            market_cap: Some(1.0e9),
            price: Some(50.0),
            is_etf: Some(false),
            is_fund: Some(false),
            is_actively_trading: Some(true),
            updated_at: Utc::now(),
        }],
    )
    .await
    .unwrap();

    let req = IngestRequest {
        start: d("2024-01-01"),
        end: d("2024-06-30"),
        window_days: 90,
        filters: UniverseFilters {
            min_market_cap: 50_000_000.0,
            max_market_cap: None,
            exchanges: vec!["NYSE".to_string()],
            include_etfs: false,
            active_only: true,
            max_symbols: 500,
        },
        archive_on_finish: false,
        archive_keep_days: None,
    };

    let started = start_resumable(&deps, &req).await.unwrap();
    run_worker(&deps, started.job_id, None, CancellationToken::new())
        .await
        .unwrap();

    let fetches_after_first_run = provider.calls.load(Ordering::SeqCst);
    assert_eq!(fetches_after_first_run, 3);

    let job_before = jobs::get(&deps.pool, started.job_id).await.unwrap().unwrap();
    assert_eq!(job_before.state, JobState::Succeeded);
    let bars_before = bars::read_daily_bars(&deps.pool, "AAA", d("2024-01-01"), d("2024-12-31"))
        .await
        .unwrap();

    // Resume: existence check, then the worker loop runs again.
    let record = resume(&deps, started.job_id).await.unwrap();
    assert_eq!(record.id, started.job_id);
    run_worker(&deps, started.job_id, None, CancellationToken::new())
        .await
        .unwrap();

    // No vendor calls, no new bars, identical terminal record.
    assert_eq!(provider.calls.load(Ordering::SeqCst), fetches_after_first_run);

    let bars_after = bars::read_daily_bars(&deps.pool, "AAA", d("2024-01-01"), d("2024-12-31"))
        .await
        .unwrap();
    assert_eq!(bars_after, bars_before);

    let job_after = jobs::get(&deps.pool, started.job_id).await.unwrap().unwrap();
    assert_eq!(job_after.state, JobState::Succeeded);
    assert_eq!(job_after.finished_at, job_before.finished_at);
    assert_eq!(job_after.symbols_attempted, job_before.symbols_attempted);
    assert_eq!(job_after.symbols_succeeded, job_before.symbols_succeeded);
    assert_eq!(job_after.symbols_failed, job_before.symbols_failed);
}
