//! Queue store: enqueue idempotence, pop ordering/tie-breaks, attempt caps,
//! stale-running recovery, and per-state counts.

use std::time::Duration;

use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use dl_db::queue;

async fn open_temp_store() -> (tempfile::TempDir, SqlitePool) {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = dl_db::open_store(&dir.path().join("test.sqlite"))
        .await
        .expect("open store");
    (dir, pool)
}

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn item(symbol: &str) -> (String, NaiveDate, NaiveDate) {
    (symbol.to_string(), d("2024-01-01"), d("2024-03-31"))
}

#[tokio::test]
async fn enqueue_is_idempotent_by_primary_key() {
    let (_dir, pool) = open_temp_store().await;
    let job_id = Uuid::new_v4();

    let items = vec![item("AAPL"), item("MSFT")];
    assert_eq!(queue::enqueue(&pool, job_id, &items).await.unwrap(), 2);

    // Second enqueue of the same items inserts nothing.
    assert_eq!(queue::enqueue(&pool, job_id, &items).await.unwrap(), 0);

    let counts = queue::counts(&pool, job_id).await.unwrap();
    assert_eq!(counts.total, 2);
    assert_eq!(counts.pending, 2);
}

#[tokio::test]
async fn pop_prefers_pending_then_low_attempts_then_symbol() {
    let (_dir, pool) = open_temp_store().await;
    let job_id = Uuid::new_v4();

    queue::enqueue(&pool, job_id, &[item("BBB"), item("AAA"), item("CCC")])
        .await
        .unwrap();

    let first = queue::pop_next(&pool, job_id, 5).await.unwrap().unwrap();
    assert_eq!(first.symbol, "AAA"); // symbol ascending among equals
    queue::mark_succeeded(&pool, &first).await.unwrap();

    let second = queue::pop_next(&pool, job_id, 5).await.unwrap().unwrap();
    assert_eq!(second.symbol, "BBB");
    queue::mark_failed(&pool, &second, "boom").await.unwrap();

    // Pending CCC (attempts=0) beats failed BBB (attempts=1).
    let third = queue::pop_next(&pool, job_id, 5).await.unwrap().unwrap();
    assert_eq!(third.symbol, "CCC");
    queue::mark_succeeded(&pool, &third).await.unwrap();

    // Only the failed BBB remains eligible; it retries with attempts=2.
    let fourth = queue::pop_next(&pool, job_id, 5).await.unwrap().unwrap();
    assert_eq!(fourth.symbol, "BBB");
    assert_eq!(fourth.attempts, 2);
}

#[tokio::test]
async fn failed_item_past_attempt_cap_is_not_popped() {
    let (_dir, pool) = open_temp_store().await;
    let job_id = Uuid::new_v4();
    let max_attempts = 3;

    queue::enqueue(&pool, job_id, &[item("AAPL")]).await.unwrap();

    for attempt in 1..=max_attempts {
        let popped = queue::pop_next(&pool, job_id, max_attempts)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(popped.attempts, attempt);
        queue::mark_failed(&pool, &popped, "vendor down").await.unwrap();
    }

    assert!(queue::pop_next(&pool, job_id, max_attempts)
        .await
        .unwrap()
        .is_none());

    let counts = queue::counts(&pool, job_id).await.unwrap();
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.total, 1);
}

#[tokio::test]
async fn pop_clears_last_error_and_stamps_attempt_time() {
    let (_dir, pool) = open_temp_store().await;
    let job_id = Uuid::new_v4();

    queue::enqueue(&pool, job_id, &[item("AAPL")]).await.unwrap();
    let popped = queue::pop_next(&pool, job_id, 5).await.unwrap().unwrap();
    queue::mark_failed(&pool, &popped, "transient").await.unwrap();

    queue::pop_next(&pool, job_id, 5).await.unwrap().unwrap();

    let (state, last_error, last_attempt_at): (String, Option<String>, Option<String>) =
        sqlx::query_as("select state, last_error, last_attempt_at from ingest_queue where job_id = ?1")
            .bind(job_id.to_string())
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(state, "running");
    assert_eq!(last_error, None);
    assert!(last_attempt_at.is_some());
}

#[tokio::test]
async fn mark_failed_truncates_long_errors() {
    let (_dir, pool) = open_temp_store().await;
    let job_id = Uuid::new_v4();

    queue::enqueue(&pool, job_id, &[item("AAPL")]).await.unwrap();
    let popped = queue::pop_next(&pool, job_id, 5).await.unwrap().unwrap();

    let long_error = "x".repeat(2_000);
    queue::mark_failed(&pool, &popped, &long_error).await.unwrap();

    let (stored,): (String,) =
        sqlx::query_as("select last_error from ingest_queue where job_id = ?1")
            .bind(job_id.to_string())
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(stored.chars().count(), 500);
}

#[tokio::test]
async fn stale_running_rows_return_to_pending_with_attempts_kept() {
    let (_dir, pool) = open_temp_store().await;
    let job_id = Uuid::new_v4();

    queue::enqueue(&pool, job_id, &[item("AAPL"), item("MSFT")])
        .await
        .unwrap();

    // Claim both; age one of them past the threshold, keep the other fresh.
    let a = queue::pop_next(&pool, job_id, 5).await.unwrap().unwrap();
    let b = queue::pop_next(&pool, job_id, 5).await.unwrap().unwrap();
    assert_ne!(a.symbol, b.symbol);

    let stale_time = Utc::now() - chrono::Duration::minutes(30);
    sqlx::query("update ingest_queue set last_attempt_at = ?1 where job_id = ?2 and symbol = ?3")
        .bind(stale_time)
        .bind(job_id.to_string())
        .bind(&a.symbol)
        .execute(&pool)
        .await
        .unwrap();

    let reset = queue::reset_stale_running(&pool, job_id, Duration::from_secs(600))
        .await
        .unwrap();
    assert_eq!(reset, 1);

    let counts = queue::counts(&pool, job_id).await.unwrap();
    assert_eq!(counts.pending, 1);
    assert_eq!(counts.running, 1);

    // The reclaimed row keeps its attempt count: the next pop is attempt 2.
    let again = queue::pop_next(&pool, job_id, 5).await.unwrap().unwrap();
    assert_eq!(again.symbol, a.symbol);
    assert_eq!(again.attempts, 2);
}

#[tokio::test]
async fn counts_by_state_cover_all_rows() {
    let (_dir, pool) = open_temp_store().await;
    let job_id = Uuid::new_v4();

    queue::enqueue(
        &pool,
        job_id,
        &[item("AAA"), item("BBB"), item("CCC"), item("DDD")],
    )
    .await
    .unwrap();

    let a = queue::pop_next(&pool, job_id, 5).await.unwrap().unwrap();
    queue::mark_succeeded(&pool, &a).await.unwrap();
    let b = queue::pop_next(&pool, job_id, 5).await.unwrap().unwrap();
    queue::mark_failed(&pool, &b, "nope").await.unwrap();
    let _c = queue::pop_next(&pool, job_id, 5).await.unwrap().unwrap();

    let counts = queue::counts(&pool, job_id).await.unwrap();
    assert_eq!(counts.succeeded, 1);
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.running, 1);
    assert_eq!(counts.pending, 1);
    assert_eq!(counts.total, 4);

    // Counts are scoped per job.
    let other = queue::counts(&pool, Uuid::new_v4()).await.unwrap();
    assert_eq!(other.total, 0);
}
