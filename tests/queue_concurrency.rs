mod support;

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use time::OffsetDateTime;

use static_regen::application::generator::GenerateOptions;
use static_regen::application::jobs::{QueueWorkerPool, enqueue_task, queue_status};
use static_regen::application::repos::{QueueRepo, RepoError};
use static_regen::domain::entities::RegenerationTask;
use static_regen::domain::types::TaskState;

use support::Harness;

fn pool_of(harness: &Harness, workers: usize) -> QueueWorkerPool {
    QueueWorkerPool::new(
        harness.repos.clone(),
        Arc::clone(&harness.generator),
        NonZeroUsize::new(workers).expect("non-zero workers"),
        Duration::from_secs(600),
    )
}

#[sqlx::test(migrations = "./migrations")]
async fn concurrent_workers_process_each_task_once(pool: SqlitePool) {
    let harness = Harness::new(pool, &[], Vec::new());
    let paths: Vec<String> = (0..24).map(|n| format!("/node/{n}")).collect();
    for path in &paths {
        enqueue_task(harness.repos.as_ref(), RegenerationTask::create(path.clone()))
            .await
            .expect("enqueue");
    }

    let report = pool_of(&harness, 4).process_all().await.expect("drain");

    assert_eq!(report.done(), paths.len());
    assert_eq!(report.failed(), 0);
    let rendered = harness.site.renders();
    assert_eq!(rendered.len(), paths.len());
    let unique: HashSet<_> = rendered.iter().collect();
    assert_eq!(unique.len(), paths.len());

    let status = queue_status(harness.repos.as_ref()).await.expect("status");
    assert_eq!(status.done, paths.len() as u64);
    assert_eq!(status.queued + status.processing + status.failed, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn delete_task_removes_artifact_and_replays_cleanly(pool: SqlitePool) {
    let harness = Harness::new(pool, &[], Vec::new());
    harness
        .generator
        .generate_page("/node/5", GenerateOptions::default())
        .await
        .expect("generate");
    let location = harness.location("/node/5");
    assert!(location.is_file());

    for _ in 0..2 {
        enqueue_task(harness.repos.as_ref(), RegenerationTask::delete("/node/5"))
            .await
            .expect("enqueue");
        let report = pool_of(&harness, 2).process_all().await.expect("drain");
        assert_eq!(report.done(), 1);
        assert_eq!(report.failed(), 0);
        assert!(!location.exists());
        assert!(
            harness
                .generator
                .index()
                .lookup_many(&[static_regen::cache::compute_cache_id(
                    support::BASE_URL,
                    "/node/5"
                )])
                .await
                .expect("lookup")
                .is_empty()
        );
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn failing_render_marks_task_failed_and_keeps_draining(pool: SqlitePool) {
    let harness = Harness::new(pool, &[], Vec::new());
    harness.site.fail("/broken");
    let broken = enqueue_task(harness.repos.as_ref(), RegenerationTask::create("/broken"))
        .await
        .expect("enqueue");
    let healthy = enqueue_task(harness.repos.as_ref(), RegenerationTask::create("/healthy"))
        .await
        .expect("enqueue");

    let report = pool_of(&harness, 1).process_all().await.expect("drain");
    assert_eq!(report.done(), 1);
    assert_eq!(report.failed(), 1);

    let broken = harness
        .repos
        .find_task(broken)
        .await
        .expect("find")
        .expect("row exists");
    assert_eq!(broken.state, TaskState::Failed);
    assert!(broken.last_error.is_some_and(|message| message.contains("500")));

    let healthy = harness
        .repos
        .find_task(healthy)
        .await
        .expect("find")
        .expect("row exists");
    assert_eq!(healthy.state, TaskState::Done);
}

#[sqlx::test(migrations = "./migrations")]
async fn alternate_path_is_rendered_for_queued_task(pool: SqlitePool) {
    let harness = Harness::new(pool, &[], Vec::new());
    enqueue_task(
        harness.repos.as_ref(),
        RegenerationTask::create(" /team ").with_generate_path("/node/9"),
    )
    .await
    .expect("enqueue");

    pool_of(&harness, 1).process_all().await.expect("drain");

    assert_eq!(harness.site.renders(), vec!["/node/9".to_string()]);
    assert!(harness.location("/team").is_file());
}

#[sqlx::test(migrations = "./migrations")]
async fn stale_claims_are_released_and_processed(pool: SqlitePool) {
    let harness = Harness::new(pool, &[], Vec::new());
    let id = enqueue_task(harness.repos.as_ref(), RegenerationTask::create("/orphan"))
        .await
        .expect("enqueue");

    let claimed = harness
        .repos
        .claim_next("crashed-worker")
        .await
        .expect("claim")
        .expect("one queued row");
    assert_eq!(claimed.id, id);
    assert_eq!(claimed.state, TaskState::Processing);
    assert!(
        harness
            .repos
            .claim_next("other-worker")
            .await
            .expect("claim")
            .is_none()
    );

    let released = harness
        .repos
        .release_stale(OffsetDateTime::now_utc() + Duration::from_secs(5))
        .await
        .expect("release");
    assert_eq!(released, 1);

    let report = pool_of(&harness, 2).process_all().await.expect("drain");
    assert_eq!(report.done(), 1);
    let row = harness
        .repos
        .find_task(id)
        .await
        .expect("find")
        .expect("row exists");
    assert_eq!(row.state, TaskState::Done);
}

#[sqlx::test(migrations = "./migrations")]
async fn enqueue_rejects_blank_paths(pool: SqlitePool) {
    let harness = Harness::new(pool, &[], Vec::new());
    let err = enqueue_task(harness.repos.as_ref(), RegenerationTask::create("   "))
        .await
        .expect_err("blank path");
    assert!(matches!(err, RepoError::InvalidInput { .. }));
}

#[sqlx::test(migrations = "./migrations")]
async fn purge_drops_only_finished_rows(pool: SqlitePool) {
    let harness = Harness::new(pool, &[], Vec::new());
    enqueue_task(harness.repos.as_ref(), RegenerationTask::create("/a"))
        .await
        .expect("enqueue");
    pool_of(&harness, 1).process_all().await.expect("drain");
    enqueue_task(harness.repos.as_ref(), RegenerationTask::create("/b"))
        .await
        .expect("enqueue");

    let purged = harness.repos.purge_finished().await.expect("purge");
    assert_eq!(purged, 1);
    let status = queue_status(harness.repos.as_ref()).await.expect("status");
    assert_eq!(status.queued, 1);
    assert_eq!(status.done, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn replaying_a_create_task_leaves_identical_state(pool: SqlitePool) {
    use static_regen::application::repos::CacheIndexRepo;
    use static_regen::cache::compute_cache_id;

    let harness = Harness::new(pool, &[], Vec::new());
    harness.site.tag("/node/5", &["node:5", "user:1"]);
    let cache_id = compute_cache_id(support::BASE_URL, "/node/5").into_inner();

    let mut snapshots = Vec::new();
    for _ in 0..2 {
        enqueue_task(harness.repos.as_ref(), RegenerationTask::create("/node/5"))
            .await
            .expect("enqueue");
        let report = pool_of(&harness, 1).process_all().await.expect("drain");
        assert_eq!(report.done(), 1);

        let bytes = std::fs::read(harness.location("/node/5")).expect("artifact");
        let rows = harness
            .repos
            .fetch_entries(std::slice::from_ref(&cache_id))
            .await
            .expect("fetch");
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        snapshots.push((
            bytes,
            row.file_location.clone(),
            row.tags.clone(),
            row.expiry,
            row.checksum.clone(),
        ));
        assert_eq!(harness.repos.list_entries().await.expect("list").len(), 1);
    }

    assert_eq!(snapshots[0], snapshots[1]);
}
