//! Live integration tests for kwrank-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/kwrank-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use kwrank_core::{
    CompetitorObservation, DemandTier, DiscoveryMethod, Platform, RankingSnapshot, Trend,
};
use kwrank_db::{
    claim_next_job, complete_job, disable_tracked_keyword, enqueue_cycle, enqueue_manual, fail_job,
    flag_needs_review, get_refresh_job, get_tracked_keyword, latest_job_for_keyword,
    latest_snapshot_before, list_competitors, list_snapshots, list_tracked_keywords, mark_tracked,
    purge_finished_jobs, recover_stale_jobs, requeue_job, retry_job,
    upsert_snapshot_with_competitors, upsert_tracked_keyword, DbError, NewTrackedKeyword,
    SnapshotWrite,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap()
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
}

async fn track(pool: &sqlx::PgPool, keyword: &str) -> i64 {
    upsert_tracked_keyword(
        pool,
        &NewTrackedKeyword {
            app_id: "1001",
            keyword,
            platform: Platform::Ios,
            region: "us",
            discovery_method: DiscoveryMethod::Manual,
        },
    )
    .await
    .unwrap_or_else(|e| panic!("track failed for '{keyword}': {e}"))
    .id
}

fn snapshot(
    keyword_id: i64,
    date: NaiveDate,
    position: Option<u32>,
    observed_at: DateTime<Utc>,
) -> RankingSnapshot {
    RankingSnapshot {
        tracked_keyword_id: keyword_id,
        snapshot_date: date,
        position,
        serp: vec!["2001".to_string(), "1001".to_string()],
        result_count: 50,
        demand_tier: DemandTier::High,
        demand_score: 68.4,
        estimated_volume: 2_630.0,
        visibility_score: 66.0,
        estimated_traffic: 32,
        position_delta: None,
        trend: Trend::New,
        observed_at,
    }
}

fn competitor(keyword_id: i64, date: NaiveDate, app: &str, position: u32) -> CompetitorObservation {
    CompetitorObservation {
        tracked_keyword_id: keyword_id,
        snapshot_date: date,
        competitor_app_id: app.to_string(),
        competitor_name: Some(format!("App {app}")),
        position,
        rating_count: Some(450_000),
    }
}

// ---------------------------------------------------------------------------
// Section 1: Tracked keywords
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn track_is_an_upsert_that_reenables(pool: sqlx::PgPool) {
    let id = track(&pool, "fitness tracker").await;
    disable_tracked_keyword(&pool, id).await.expect("disable failed");
    assert!(!get_tracked_keyword(&pool, id).await.unwrap().is_tracking);

    let again = track(&pool, "fitness tracker").await;
    assert_eq!(again, id, "re-tracking must reuse the existing row");
    assert!(get_tracked_keyword(&pool, id).await.unwrap().is_tracking);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tracked_keywords")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn list_tracked_keywords_can_skip_disabled(pool: sqlx::PgPool) {
    let a = track(&pool, "step counter").await;
    track(&pool, "workout planner").await;
    disable_tracked_keyword(&pool, a).await.unwrap();

    assert_eq!(list_tracked_keywords(&pool, false).await.unwrap().len(), 2);
    let tracking = list_tracked_keywords(&pool, true).await.unwrap();
    assert_eq!(tracking.len(), 1);
    assert_eq!(tracking[0].keyword, "workout planner");
}

#[sqlx::test(migrations = "../../migrations")]
async fn flag_and_mark_tracked_update_keyword(pool: sqlx::PgPool) {
    let id = track(&pool, "fitness tracker").await;
    flag_needs_review(&pool, id).await.unwrap();
    mark_tracked(&pool, id, at(5)).await.unwrap();
    mark_tracked(&pool, id, at(4)).await.unwrap();

    let row = get_tracked_keyword(&pool, id).await.unwrap();
    assert!(row.needs_review);
    assert_eq!(row.last_tracked_at, Some(at(5)), "last_tracked_at never moves backwards");

    assert!(matches!(
        flag_needs_review(&pool, 999_999).await,
        Err(DbError::NotFound)
    ));
}

// ---------------------------------------------------------------------------
// Section 2: Snapshot idempotency
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn writing_the_same_snapshot_twice_stores_one_row(pool: sqlx::PgPool) {
    let id = track(&pool, "fitness tracker").await;
    let snap = snapshot(id, day(2), Some(7), at(3));
    let competitors = vec![competitor(id, day(2), "2001", 1)];

    let first = upsert_snapshot_with_competitors(&pool, &snap, &competitors)
        .await
        .expect("first write failed");
    let second = upsert_snapshot_with_competitors(&pool, &snap, &competitors)
        .await
        .expect("second write failed");

    assert!(matches!(first, SnapshotWrite::Written { .. }));
    assert_eq!(second, SnapshotWrite::Unchanged);

    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM ranking_snapshots WHERE tracked_keyword_id = $1",
    )
    .bind(id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(count, 1);
    assert_eq!(list_competitors(&pool, id, day(2)).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn older_attempt_never_overwrites_newer_snapshot(pool: sqlx::PgPool) {
    let id = track(&pool, "fitness tracker").await;

    let newer = snapshot(id, day(2), Some(4), at(6));
    upsert_snapshot_with_competitors(&pool, &newer, &[competitor(id, day(2), "2001", 1)])
        .await
        .unwrap();

    let older = snapshot(id, day(2), Some(9), at(3));
    let outcome = upsert_snapshot_with_competitors(
        &pool,
        &older,
        &[competitor(id, day(2), "2002", 1), competitor(id, day(2), "2003", 2)],
    )
    .await
    .unwrap();
    assert_eq!(outcome, SnapshotWrite::Unchanged);

    let rows = list_snapshots(&pool, id, day(1), day(3)).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].position, Some(4));
    let competitors = list_competitors(&pool, id, day(2)).await.unwrap();
    assert_eq!(competitors.len(), 1);
    assert_eq!(competitors[0].competitor_app_id, "2001");
}

#[sqlx::test(migrations = "../../migrations")]
async fn newer_attempt_replaces_snapshot_and_competitors(pool: sqlx::PgPool) {
    let id = track(&pool, "fitness tracker").await;
    upsert_snapshot_with_competitors(
        &pool,
        &snapshot(id, day(2), Some(9), at(3)),
        &[competitor(id, day(2), "2001", 1), competitor(id, day(2), "2002", 2)],
    )
    .await
    .unwrap();

    upsert_snapshot_with_competitors(
        &pool,
        &snapshot(id, day(2), Some(4), at(6)),
        &[competitor(id, day(2), "2009", 1)],
    )
    .await
    .unwrap();

    let rows = list_snapshots(&pool, id, day(2), day(2)).await.unwrap();
    assert_eq!(rows[0].position, Some(4));
    let competitors = list_competitors(&pool, id, day(2)).await.unwrap();
    assert_eq!(competitors.len(), 1);
    assert_eq!(competitors[0].competitor_app_id, "2009");
}

#[sqlx::test(migrations = "../../migrations")]
async fn latest_snapshot_before_excludes_the_given_day(pool: sqlx::PgPool) {
    let id = track(&pool, "fitness tracker").await;
    for (d, pos) in [(1, 10), (2, 7)] {
        upsert_snapshot_with_competitors(&pool, &snapshot(id, day(d), Some(pos), at(3)), &[])
            .await
            .unwrap();
    }

    let prior = latest_snapshot_before(&pool, id, day(2)).await.unwrap().unwrap();
    assert_eq!(prior.snapshot_date, day(1));
    assert_eq!(prior.position, Some(10));
    assert!(latest_snapshot_before(&pool, id, day(1)).await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Section 3: Refresh queue
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn cycle_enqueues_one_staggered_job_per_tracked_keyword(pool: sqlx::PgPool) {
    let ids = [
        track(&pool, "a").await,
        track(&pool, "b").await,
        track(&pool, "c").await,
        track(&pool, "d").await,
    ];
    disable_tracked_keyword(&pool, ids[3]).await.unwrap();

    let window = Duration::from_secs(3 * 3600);
    let inserted = enqueue_cycle(&pool, at(0), window, 3).await.unwrap();
    assert_eq!(inserted, 3);

    let again = enqueue_cycle(&pool, at(0), window, 3).await.unwrap();
    assert_eq!(again, 0, "keywords with a live job are skipped");

    let slots: Vec<DateTime<Utc>> = sqlx::query_scalar(
        "SELECT scheduled_at FROM refresh_jobs ORDER BY scheduled_at",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(slots, vec![at(0), at(1), at(2)]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn claim_orders_by_priority_then_schedule(pool: sqlx::PgPool) {
    let a = track(&pool, "a").await;
    let b = track(&pool, "b").await;
    enqueue_cycle(&pool, at(0), Duration::from_secs(3600), 3)
        .await
        .unwrap();
    enqueue_manual(&pool, &[b], 10, 3, at(0)).await.unwrap();

    let first = claim_next_job(&pool, at(2)).await.unwrap().unwrap();
    assert_eq!(first.tracked_keyword_id, b, "manual refresh jumps the queue");
    assert_eq!(first.status, "processing");
    let second = claim_next_job(&pool, at(2)).await.unwrap().unwrap();
    assert_eq!(second.tracked_keyword_id, a);
    assert!(claim_next_job(&pool, at(2)).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn future_jobs_are_not_claimed(pool: sqlx::PgPool) {
    track(&pool, "a").await;
    track(&pool, "b").await;
    enqueue_cycle(&pool, at(1), Duration::from_secs(7200), 3)
        .await
        .unwrap();

    assert!(claim_next_job(&pool, at(0)).await.unwrap().is_none());
    assert!(claim_next_job(&pool, at(1)).await.unwrap().is_some());
    assert!(claim_next_job(&pool, at(1)).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn disabled_keyword_jobs_are_never_claimed(pool: sqlx::PgPool) {
    let id = track(&pool, "a").await;
    enqueue_manual(&pool, &[id], 10, 3, at(0)).await.unwrap();
    disable_tracked_keyword(&pool, id).await.unwrap();

    assert!(claim_next_job(&pool, at(1)).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn manual_refresh_promotes_existing_pending_job(pool: sqlx::PgPool) {
    let id = track(&pool, "a").await;
    enqueue_cycle(&pool, at(5), Duration::from_secs(60), 3)
        .await
        .unwrap();

    let touched = enqueue_manual(&pool, &[id], 10, 3, at(1)).await.unwrap();
    assert_eq!(touched, 1);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM refresh_jobs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);

    let job = claim_next_job(&pool, at(1)).await.unwrap().unwrap();
    assert_eq!(job.priority, 10);
}

#[sqlx::test(migrations = "../../migrations")]
async fn job_lifecycle_retry_then_complete(pool: sqlx::PgPool) {
    let id = track(&pool, "a").await;
    enqueue_manual(&pool, &[id], 10, 3, at(0)).await.unwrap();
    let job = claim_next_job(&pool, at(0)).await.unwrap().unwrap();

    retry_job(&pool, job.id, 1, at(1), "network_timeout: timed out")
        .await
        .unwrap();
    let pending = get_refresh_job(&pool, job.id).await.unwrap();
    assert_eq!(pending.status, "pending");
    assert_eq!(pending.retry_count, 1);
    assert_eq!(pending.scheduled_at, at(1));

    let job = claim_next_job(&pool, at(1)).await.unwrap().unwrap();
    complete_job(&pool, job.id, at(1)).await.unwrap();
    let done = get_refresh_job(&pool, job.id).await.unwrap();
    assert_eq!(done.status, "completed");
    assert!(done.error_detail.is_none());

    let err = complete_job(&pool, job.id, at(2)).await.unwrap_err();
    assert!(matches!(
        err,
        DbError::InvalidJobTransition {
            expected_status: "processing",
            ..
        }
    ));
}

#[sqlx::test(migrations = "../../migrations")]
async fn failed_job_is_terminal(pool: sqlx::PgPool) {
    let id = track(&pool, "a").await;
    enqueue_manual(&pool, &[id], 10, 3, at(0)).await.unwrap();
    let job = claim_next_job(&pool, at(0)).await.unwrap().unwrap();
    fail_job(&pool, job.id, "not_found: endpoint not found", at(0))
        .await
        .unwrap();

    assert!(claim_next_job(&pool, at(9)).await.unwrap().is_none());
    let latest = latest_job_for_keyword(&pool, id).await.unwrap().unwrap();
    assert_eq!(latest.status, "failed");
    assert!(retry_job(&pool, job.id, 1, at(1), "x").await.is_err());
}

#[sqlx::test(migrations = "../../migrations")]
async fn requeue_keeps_retry_count(pool: sqlx::PgPool) {
    let id = track(&pool, "a").await;
    enqueue_manual(&pool, &[id], 10, 3, at(0)).await.unwrap();
    let job = claim_next_job(&pool, at(0)).await.unwrap().unwrap();
    retry_job(&pool, job.id, 2, at(0), "x").await.unwrap();
    let job = claim_next_job(&pool, at(0)).await.unwrap().unwrap();

    requeue_job(&pool, job.id).await.unwrap();
    let row = get_refresh_job(&pool, job.id).await.unwrap();
    assert_eq!(row.status, "pending");
    assert_eq!(row.retry_count, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn cycle_skips_keywords_flagged_for_review(pool: sqlx::PgPool) {
    let healthy = track(&pool, "a").await;
    let flagged = track(&pool, "b").await;
    flag_needs_review(&pool, flagged).await.unwrap();

    let inserted = enqueue_cycle(&pool, at(0), Duration::from_secs(3600), 3)
        .await
        .unwrap();
    assert_eq!(inserted, 1);
    assert!(latest_job_for_keyword(&pool, healthy).await.unwrap().is_some());
    assert!(latest_job_for_keyword(&pool, flagged).await.unwrap().is_none());

    assert_eq!(enqueue_manual(&pool, &[flagged], 10, 3, at(0)).await.unwrap(), 1);
    let claimed = claim_next_job(&pool, at(1)).await.unwrap().unwrap();
    assert_eq!(claimed.tracked_keyword_id, flagged, "manual refresh overrides the flag");
    complete_job(&pool, claimed.id, at(1)).await.unwrap();
    mark_tracked(&pool, flagged, at(1)).await.unwrap();
    assert!(!get_tracked_keyword(&pool, flagged).await.unwrap().needs_review);
}

#[sqlx::test(migrations = "../../migrations")]
async fn concurrent_claims_never_share_a_job(pool: sqlx::PgPool) {
    const KEYWORDS: usize = 5;
    const WORKERS: usize = 8;

    for i in 0..KEYWORDS {
        track(&pool, &format!("kw{i}")).await;
    }
    let inserted = enqueue_cycle(&pool, at(0), Duration::ZERO, 3).await.unwrap();
    assert_eq!(inserted, KEYWORDS as u64);

    let mut claims = tokio::task::JoinSet::new();
    for _ in 0..WORKERS {
        let pool = pool.clone();
        claims.spawn(async move { claim_next_job(&pool, at(1)).await });
    }
    let mut claimed = Vec::new();
    while let Some(result) = claims.join_next().await {
        if let Some(job) = result.unwrap().unwrap() {
            claimed.push(job.id);
        }
    }

    claimed.sort_unstable();
    let before = claimed.len();
    claimed.dedup();
    assert_eq!(claimed.len(), before, "a job was handed to two workers");
    assert_eq!(claimed.len(), KEYWORDS);
    assert!(claim_next_job(&pool, at(1)).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn stale_processing_jobs_are_recovered(pool: sqlx::PgPool) {
    let id = track(&pool, "a").await;
    enqueue_manual(&pool, &[id], 10, 3, at(0)).await.unwrap();
    claim_next_job(&pool, at(0)).await.unwrap().unwrap();

    let lease = Duration::from_secs(900);
    assert_eq!(recover_stale_jobs(&pool, at(0), lease).await.unwrap(), 0);
    assert_eq!(recover_stale_jobs(&pool, at(1), lease).await.unwrap(), 1);
    assert!(claim_next_job(&pool, at(1)).await.unwrap().is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn finished_jobs_are_purged_after_retention(pool: sqlx::PgPool) {
    let id = track(&pool, "a").await;
    enqueue_manual(&pool, &[id], 10, 3, at(0)).await.unwrap();
    let job = claim_next_job(&pool, at(0)).await.unwrap().unwrap();
    complete_job(&pool, job.id, at(0)).await.unwrap();

    let retention = Duration::from_secs(3600);
    assert_eq!(purge_finished_jobs(&pool, at(0), retention).await.unwrap(), 0);
    assert_eq!(purge_finished_jobs(&pool, at(2), retention).await.unwrap(), 1);
    assert!(latest_job_for_keyword(&pool, id).await.unwrap().is_none());
}
