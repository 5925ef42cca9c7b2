use std::{
    num::NonZeroUsize,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use futures::future::join_all;
use hubdown::{
    CacheError, CacheKey, CacheLookup, CacheStore, FileCacheStore, HighlightOptions, Hubdown,
    MemoryCacheStore, RenderOptions, RenderResult,
};
use serde_json::Map;
use tempfile::TempDir;
use tokio::sync::Barrier;

const BASIC: &str = include_str!("fixtures/basic.md");
const FRONTMATTER: &str = include_str!("fixtures/frontmatter.md");
const UNKNOWN_LANGUAGE: &str = include_str!("fixtures/unknown-language.md");

fn memory_store() -> Arc<MemoryCacheStore> {
    Arc::new(MemoryCacheStore::new(
        NonZeroUsize::new(32).unwrap_or(NonZeroUsize::MIN),
    ))
}

fn service_with(store: Arc<dyn CacheStore>) -> Hubdown {
    Hubdown::builder().cache(store).build().expect("service")
}

#[tokio::test]
async fn renders_are_stored_under_their_key() {
    let store = memory_store();
    let service = service_with(store.clone());

    let result = service
        .render("Cache me please", &RenderOptions::new())
        .await
        .expect("render");
    assert_eq!(result.content(), "<p>Cache me please</p>");

    let key = CacheKey::derive("Cache me please", &RenderOptions::new());
    let cached = store.get(&key).await.found().expect("stored");
    assert_eq!(cached.content(), "<p>Cache me please</p>");
}

#[tokio::test]
async fn cached_entries_are_returned_verbatim() {
    let store = memory_store();
    let key = CacheKey::derive(BASIC, &RenderOptions::new());
    store
        .put(&key, &RenderResult::new("I came from the cache", Map::new()))
        .await
        .expect("seed");

    let uncached = Hubdown::builder()
        .build()
        .expect("service")
        .render(BASIC, &RenderOptions::new())
        .await
        .expect("render");
    assert!(uncached.content().contains("<h2"));

    let cached = service_with(store)
        .render(BASIC, &RenderOptions::new())
        .await
        .expect("render");
    assert_eq!(cached.content(), "I came from the cache");
}

#[tokio::test]
async fn cached_entries_skip_frontmatter_extraction() {
    let store = memory_store();
    let options = RenderOptions::new().with_frontmatter(true);
    let key = CacheKey::derive(FRONTMATTER, &options);
    store
        .put(&key, &RenderResult::new("stored", Map::new()))
        .await
        .expect("seed");

    let cached = service_with(store)
        .render(FRONTMATTER, &options)
        .await
        .expect("render");
    assert_eq!(cached.content(), "stored");
    assert!(cached.get("title").is_none());
}

#[tokio::test]
async fn options_change_the_cache_entry() {
    let store = memory_store();
    let service = service_with(store.clone());

    service
        .render(FRONTMATTER, &RenderOptions::new())
        .await
        .expect("plain");
    let with_frontmatter = RenderOptions::new().with_frontmatter(true);
    service
        .render(FRONTMATTER, &with_frontmatter)
        .await
        .expect("frontmatter");

    assert_eq!(store.len(), 2);
    let stored = store
        .get(&CacheKey::derive(FRONTMATTER, &with_frontmatter))
        .await
        .found()
        .expect("stored");
    assert_eq!(
        stored.get("author").and_then(|v| v.as_str()),
        Some("zeke")
    );
}

#[tokio::test]
async fn failed_renders_are_not_cached() {
    let store = memory_store();
    let service = service_with(store.clone());

    service
        .render(UNKNOWN_LANGUAGE, &RenderOptions::new())
        .await
        .expect_err("unknown language");
    assert!(store.is_empty());

    let lenient = RenderOptions::new().with_highlight(HighlightOptions {
        ignore_missing: Some(true),
        ..Default::default()
    });
    service
        .render(UNKNOWN_LANGUAGE, &lenient)
        .await
        .expect("lenient render");
    assert_eq!(store.len(), 1);
}

struct BrokenStore;

#[async_trait]
impl CacheStore for BrokenStore {
    async fn get(&self, _key: &CacheKey) -> CacheLookup {
        CacheLookup::Failed(CacheError::backend("disk on fire"))
    }

    async fn put(&self, _key: &CacheKey, _result: &RenderResult) -> Result<(), CacheError> {
        Err(CacheError::backend("disk still on fire"))
    }
}

#[tokio::test]
async fn cache_failures_never_fail_the_render() {
    let service = service_with(Arc::new(BrokenStore));
    let result = service
        .render("Hello *world*", &RenderOptions::new())
        .await
        .expect("render despite cache failures");
    assert_eq!(result.content(), "<p>Hello <em>world</em></p>");
}

#[tokio::test]
async fn output_is_identical_with_and_without_a_cache() {
    let plain = Hubdown::builder().build().expect("service");
    let cached = service_with(memory_store());

    for options in [
        RenderOptions::new(),
        RenderOptions::new().with_frontmatter(true),
        RenderOptions::new().with_dangerous_html(false),
    ] {
        let expected = plain.render(FRONTMATTER, &options).await.expect("plain");
        let miss = cached.render(FRONTMATTER, &options).await.expect("miss");
        let hit = cached.render(FRONTMATTER, &options).await.expect("hit");
        assert_eq!(expected, miss);
        assert_eq!(expected, hit);
    }
}

/// Every lookup waits until all renders have looked up, so each one misses.
struct SimultaneousMisses {
    lookups: Barrier,
    puts: AtomicUsize,
}

impl SimultaneousMisses {
    fn new(renders: usize) -> Self {
        Self {
            lookups: Barrier::new(renders),
            puts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CacheStore for SimultaneousMisses {
    async fn get(&self, _key: &CacheKey) -> CacheLookup {
        self.lookups.wait().await;
        CacheLookup::NotFound
    }

    async fn put(&self, _key: &CacheKey, _result: &RenderResult) -> Result<(), CacheError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn concurrent_misses_each_render_and_store() {
    const RENDERS: usize = 8;

    let store = Arc::new(SimultaneousMisses::new(RENDERS));
    let service = service_with(store.clone());
    let options = RenderOptions::new();

    let renders = (0..RENDERS).map(|_| service.render(BASIC, &options));
    let results: Vec<_> = join_all(renders)
        .await
        .into_iter()
        .map(|result| result.expect("render"))
        .collect();

    assert_eq!(results.len(), RENDERS);
    assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(store.puts.load(Ordering::SeqCst), RENDERS);
}

#[tokio::test]
async fn file_store_persists_between_services() {
    let dir = TempDir::new().expect("tempdir");
    let options = RenderOptions::new().with_frontmatter(true);

    let first = service_with(Arc::new(FileCacheStore::new(dir.path()).expect("store")))
        .render(FRONTMATTER, &options)
        .await
        .expect("first render");

    let store = FileCacheStore::new(dir.path()).expect("store");
    let key = CacheKey::derive(FRONTMATTER, &options);
    assert!(store.entry_path(&key).exists());

    let second = service_with(Arc::new(store))
        .render(FRONTMATTER, &options)
        .await
        .expect("second render");
    assert_eq!(first, second);
    assert_eq!(
        second.get("title").and_then(|v| v.as_str()),
        Some("Project of the Week: WebTorrent")
    );
}
