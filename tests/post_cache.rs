use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use quaderno::application::audit::AuditService;
use quaderno::application::posts::PostService;
use quaderno::application::repos::{CreatePostParams, PostsRepo, RepoError, UpdatePostParams};
use quaderno::cache::{CacheConfig, CachedPostsRepo, PostCache};
use quaderno::domain::entities::PostRecord;
use quaderno::domain::error::ErrorKind;
use quaderno::infra::memory::MemoryRepositories;
use serial_test::serial;
use tokio::sync::Notify;

fn snapshotter() -> &'static Snapshotter {
    static SNAPSHOTTER: OnceLock<Snapshotter> = OnceLock::new();
    SNAPSHOTTER.get_or_init(|| {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        recorder
            .install()
            .expect("debug metrics recorder should install in this test process");
        snapshotter
    })
}

struct Harness {
    service: PostService,
    cache: Arc<PostCache>,
    repos: Arc<MemoryRepositories>,
}

fn harness(config: CacheConfig) -> Harness {
    let repos = Arc::new(MemoryRepositories::new());
    let cache = Arc::new(PostCache::for_posts(&config));
    let cached = Arc::new(CachedPostsRepo::new(
        repos.clone(),
        cache.clone(),
        config.post_ttl(),
    ));
    let service = PostService::new(cached, AuditService::new(repos.clone()));
    Harness {
        service,
        cache,
        repos,
    }
}

#[tokio::test]
#[serial]
async fn created_post_is_cached_until_deleted() {
    let h = harness(CacheConfig::default());

    let post = h.service.create(1, "T", "B").await.expect("created");
    assert_eq!(post.author_id, 1);
    assert_eq!(h.cache.get(&post.id), Some(post.clone()));

    h.service.delete(1, post.id).await.expect("deleted");

    assert!(h.cache.get(&post.id).is_none());
    assert!(h.repos.find_post(post.id).await.expect("lookup").is_none());
    assert_eq!(
        h.service.get(1, post.id).await.expect_err("gone").kind(),
        ErrorKind::NotFound
    );
}

#[tokio::test]
#[serial]
async fn reads_fall_through_after_eviction() {
    let h = harness(CacheConfig::default());
    let post = h.service.create(1, "T", "B").await.expect("created");

    assert!(h.cache.delete(&post.id));
    let fetched = h.service.get(2, post.id).await.expect("fetched");

    assert_eq!(fetched, post);
    assert!(h.cache.contains(&post.id));
}

#[tokio::test]
#[serial]
async fn update_is_visible_through_the_cache() {
    let h = harness(CacheConfig::default());
    let post = h.service.create(1, "T", "B").await.expect("created");

    h.service
        .update(2, post.id, Some("T2"), None)
        .await
        .expect("updated");

    let fetched = h.service.get(1, post.id).await.expect("fetched");
    assert_eq!(fetched.title, "T2");
    assert_eq!(fetched.body, "B");
    assert!(fetched.updated_at >= post.updated_at);
}

#[tokio::test(start_paused = true)]
#[serial]
async fn expired_entries_reload_from_repository() {
    let config = CacheConfig {
        post_ttl_seconds: 5,
        ..CacheConfig::default()
    };
    let h = harness(config);
    let post = h.service.create(1, "T", "B").await.expect("created");

    tokio::time::advance(Duration::from_secs(6)).await;
    assert!(h.cache.get(&post.id).is_none());

    let fetched = h.service.get(1, post.id).await.expect("reloaded");
    assert_eq!(fetched, post);
    assert!(h.cache.contains(&post.id));
}

#[tokio::test]
#[serial]
async fn cache_paths_emit_expected_metric_keys() {
    let snapshotter = snapshotter();
    let h = harness(CacheConfig {
        post_limit: 1,
        ..CacheConfig::default()
    });

    let first = h.service.create(1, "one", "B").await.expect("created");
    h.service.get(1, first.id).await.expect("hit");
    let second = h.service.create(1, "two", "B").await.expect("created");
    assert!(!h.cache.contains(&first.id));
    h.service.get(1, first.id).await.expect("miss then reload");
    assert!(h.cache.contains(&first.id));
    assert!(!h.cache.contains(&second.id));

    let snapshot = snapshotter.snapshot().into_vec();
    let names: HashSet<String> = snapshot
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    for metric in [
        "quaderno_post_cache_hit_total",
        "quaderno_post_cache_miss_total",
        "quaderno_post_cache_evict_total",
    ] {
        assert!(names.contains(metric), "missing metric: {metric}");
    }

    let capacity_evictions = snapshot.iter().any(|(composite_key, _, _, value)| {
        let key = composite_key.key();
        key.name() == "quaderno_post_cache_evict_total"
            && key
                .labels()
                .any(|label| label.key() == "reason" && label.value() == "capacity")
            && matches!(value, DebugValue::Counter(count) if *count > 0)
    });
    assert!(capacity_evictions, "capacity eviction was not counted");
}

/// Holds the next read after it has loaded its rows, until released.
struct StalledReads {
    inner: Arc<MemoryRepositories>,
    armed: AtomicBool,
    loaded: Notify,
    release: Notify,
}

impl StalledReads {
    fn new(inner: Arc<MemoryRepositories>) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(true),
            loaded: Notify::new(),
            release: Notify::new(),
        }
    }

    async fn hold(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.loaded.notify_one();
            self.release.notified().await;
        }
    }
}

#[async_trait]
impl PostsRepo for StalledReads {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        self.inner.create_post(params).await
    }

    async fn find_post(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        let post = self.inner.find_post(id).await?;
        self.hold().await;
        Ok(post)
    }

    async fn list_posts(&self) -> Result<Vec<PostRecord>, RepoError> {
        let posts = self.inner.list_posts().await?;
        self.hold().await;
        Ok(posts)
    }

    async fn update_post(
        &self,
        id: i64,
        params: UpdatePostParams,
    ) -> Result<Option<PostRecord>, RepoError> {
        let post = self.inner.update_post(id, params).await?;
        self.hold().await;
        Ok(post)
    }

    async fn delete_post(&self, id: i64) -> Result<bool, RepoError> {
        self.inner.delete_post(id).await
    }
}

struct RaceHarness {
    repos: Arc<MemoryRepositories>,
    stalled: Arc<StalledReads>,
    cached: Arc<CachedPostsRepo>,
    cache: Arc<PostCache>,
}

fn race_harness() -> RaceHarness {
    let config = CacheConfig::default();
    let repos = Arc::new(MemoryRepositories::new());
    let stalled = Arc::new(StalledReads::new(repos.clone()));
    let cache = Arc::new(PostCache::for_posts(&config));
    let cached = Arc::new(CachedPostsRepo::new(
        stalled.clone(),
        cache.clone(),
        config.post_ttl(),
    ));
    RaceHarness {
        repos,
        stalled,
        cached,
        cache,
    }
}

fn new_post(title: &str) -> CreatePostParams {
    CreatePostParams {
        title: title.to_string(),
        body: "B".to_string(),
        author_id: 1,
    }
}

#[tokio::test]
#[serial]
async fn read_miss_racing_a_delete_does_not_cache_the_deleted_post() {
    let h = race_harness();
    let id = h.repos.create_post(new_post("T")).await.expect("created").id;

    let reader = tokio::spawn({
        let cached = h.cached.clone();
        async move { cached.find_post(id).await }
    });
    h.stalled.loaded.notified().await;

    assert!(h.cached.delete_post(id).await.expect("deleted"));
    h.stalled.release.notify_one();
    reader.await.expect("reader joined").expect("read");

    assert!(!h.cache.contains(&id));
    assert!(h.cached.find_post(id).await.expect("lookup").is_none());
}

#[tokio::test]
#[serial]
async fn list_racing_a_delete_does_not_cache_the_deleted_post() {
    let h = race_harness();
    let kept = h.repos.create_post(new_post("kept")).await.expect("created");
    let doomed = h.repos.create_post(new_post("doomed")).await.expect("created");

    let lister = tokio::spawn({
        let cached = h.cached.clone();
        async move { cached.list_posts().await }
    });
    h.stalled.loaded.notified().await;

    assert!(h.cached.delete_post(doomed.id).await.expect("deleted"));
    h.stalled.release.notify_one();
    let listed = lister.await.expect("lister joined").expect("listed");
    assert_eq!(listed.len(), 2);

    assert!(!h.cache.contains(&doomed.id));
    assert!(h.cached.find_post(doomed.id).await.expect("lookup").is_none());
    assert_eq!(
        h.cached.find_post(kept.id).await.expect("lookup"),
        Some(kept)
    );
}

#[tokio::test]
#[serial]
async fn update_racing_a_delete_does_not_cache_the_deleted_post() {
    let h = race_harness();
    let id = h.repos.create_post(new_post("T")).await.expect("created").id;

    let writer = tokio::spawn({
        let cached = h.cached.clone();
        async move {
            cached
                .update_post(
                    id,
                    UpdatePostParams {
                        title: Some("T2".to_string()),
                        body: None,
                    },
                )
                .await
        }
    });
    h.stalled.loaded.notified().await;

    assert!(h.cached.delete_post(id).await.expect("deleted"));
    h.stalled.release.notify_one();
    writer.await.expect("writer joined").expect("updated");

    assert!(!h.cache.contains(&id));
    assert!(h.cached.find_post(id).await.expect("lookup").is_none());
}
