//! Read-through/write-through post cache in front of a [`PostsRepo`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::application::repos::{CreatePostParams, PostsRepo, RepoError, UpdatePostParams};
use crate::domain::entities::PostRecord;

use super::config::CacheConfig;
use super::store::{FillTicket, POST_CACHE_METRICS, TtlCache};

/// Shared post cache keyed by post id.
pub type PostCache = TtlCache<i64, PostRecord>;

impl PostCache {
    pub fn for_posts(config: &CacheConfig) -> Self {
        TtlCache::new(config.post_limit_non_zero(), POST_CACHE_METRICS)
    }
}

/// Decorates a post repository with a [`PostCache`].
///
/// The repository stays authoritative: every write reaches it, list results
/// always come from it, and a cache entry is dropped before any mutation so
/// readers fall back to a miss rather than a stale hit. Rows are cached
/// through [`FillTicket`]s taken before the repository call, so a row read
/// before a concurrent delete is never cached after it.
pub struct CachedPostsRepo {
    inner: Arc<dyn PostsRepo>,
    cache: Arc<PostCache>,
    ttl: Duration,
}

impl CachedPostsRepo {
    pub fn new(inner: Arc<dyn PostsRepo>, cache: Arc<PostCache>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }

    pub fn cache(&self) -> &Arc<PostCache> {
        &self.cache
    }

    fn remember(&self, ticket: FillTicket, post: &PostRecord) {
        if !self.cache.fill(ticket, post.id, post.clone(), self.ttl) {
            debug!(
                target = "quaderno::cache::posts",
                post_id = post.id,
                "skipping cache fill raced by a delete"
            );
        }
    }
}

#[async_trait]
impl PostsRepo for CachedPostsRepo {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let ticket = self.cache.fill_ticket();
        let post = self.inner.create_post(params).await?;
        self.remember(ticket, &post);
        Ok(post)
    }

    async fn find_post(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        if let Some(post) = self.cache.get(&id) {
            return Ok(Some(post));
        }

        let ticket = self.cache.fill_ticket();
        let post = self.inner.find_post(id).await?;
        if let Some(post) = post.as_ref() {
            debug!(
                target = "quaderno::cache::posts",
                post_id = id,
                "repopulating post cache after miss"
            );
            self.remember(ticket, post);
        }
        Ok(post)
    }

    async fn list_posts(&self) -> Result<Vec<PostRecord>, RepoError> {
        let ticket = self.cache.fill_ticket();
        let posts = self.inner.list_posts().await?;
        for post in posts.iter().filter(|post| !self.cache.contains(&post.id)) {
            self.remember(ticket, post);
        }
        Ok(posts)
    }

    async fn update_post(
        &self,
        id: i64,
        params: UpdatePostParams,
    ) -> Result<Option<PostRecord>, RepoError> {
        self.cache.delete(&id);
        let ticket = self.cache.fill_ticket();
        let updated = self.inner.update_post(id, params).await?;
        if let Some(post) = updated.as_ref() {
            self.remember(ticket, post);
        }
        Ok(updated)
    }

    async fn delete_post(&self, id: i64) -> Result<bool, RepoError> {
        self.cache.delete(&id);
        let result = self.inner.delete_post(id).await;
        // Drops fills whose ticket was taken after the first eviction.
        self.cache.delete(&id);
        result
    }
}
