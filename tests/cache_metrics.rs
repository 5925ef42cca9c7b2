use std::{collections::HashSet, num::NonZeroUsize, sync::Arc};

use async_trait::async_trait;
use hubdown::{
    CacheError, CacheKey, CacheLookup, CacheStore, Hubdown, MemoryCacheStore, RenderOptions,
    RenderResult,
};
use metrics_util::debugging::DebuggingRecorder;

struct BrokenStore;

#[async_trait]
impl CacheStore for BrokenStore {
    async fn get(&self, _key: &CacheKey) -> CacheLookup {
        CacheLookup::Failed(CacheError::backend("unavailable"))
    }

    async fn put(&self, _key: &CacheKey, _result: &RenderResult) -> Result<(), CacheError> {
        Err(CacheError::backend("unavailable"))
    }
}

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    // Memory store: miss, hit, then an eviction at capacity one.
    let store = Arc::new(MemoryCacheStore::new(NonZeroUsize::MIN));
    let service = Hubdown::builder()
        .cache(store)
        .build()
        .expect("service should build");
    let options = RenderOptions::new();

    service.render("first", &options).await.expect("miss");
    service.render("first", &options).await.expect("hit");
    service.render("second", &options).await.expect("evicting miss");

    // Failing store: lookup error and put error, render still succeeds.
    let broken = Hubdown::builder()
        .cache(Arc::new(BrokenStore))
        .build()
        .expect("service should build");
    broken.render("third", &options).await.expect("render");

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "hubdown_cache_hit_total",
        "hubdown_cache_miss_total",
        "hubdown_cache_error_total",
        "hubdown_cache_put_error_total",
        "hubdown_cache_evict_total",
        "hubdown_render_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
