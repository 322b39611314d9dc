mod support;

use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use sqlx::SqlitePool;

use static_regen::application::generator::GenerateOptions;

use support::{BASE_URL, Harness};

#[sqlx::test(migrations = "./migrations")]
async fn cache_lookups_emit_hit_miss_and_exclusion_counters(pool: SqlitePool) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let harness = Harness::new(pool, &["/preview"], Vec::new());
    harness
        .generator
        .generate_page("/node/1", GenerateOptions::default())
        .await
        .expect("generate");

    let paths = vec![
        "/node/1".to_string(),
        "/node/2".to_string(),
        "/preview/1".to_string(),
    ];
    harness
        .generator
        .index()
        .filter_uncached(BASE_URL, &paths)
        .await
        .expect("filter uncached");
    harness.generator.collect_garbage().await.expect("gc");

    let snapshot = snapshotter.snapshot().into_vec();
    let counter = |name: &str| -> u64 {
        snapshot
            .iter()
            .filter(|(key, _, _, _)| key.key().name() == name)
            .map(|(_, _, _, value)| match value {
                DebugValue::Counter(count) => *count,
                _ => 0,
            })
            .sum()
    };
    let seen = |name: &str| snapshot.iter().any(|(key, _, _, _)| key.key().name() == name);

    assert_eq!(counter("static_regen_cache_hit_total"), 1);
    // One miss from the initial generate plus `/node/2`.
    assert_eq!(counter("static_regen_cache_miss_total"), 2);
    assert_eq!(counter("static_regen_cache_excluded_total"), 1);
    assert!(seen("static_regen_render_ms"));
}
