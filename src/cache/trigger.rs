//! Cache invalidation entry point for write services.

use std::sync::Arc;

use metrics::counter;
use tracing::debug;

use super::config::CacheConfig;
use super::store::PageStore;
use super::METRIC_PAGE_CACHE_INVALIDATE;

/// What kind of write caused an invalidation. Only used for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationReason {
    PostCreated { post_id: i64 },
    PostUpdated { post_id: i64 },
    CommentCreated { post_id: i64 },
}

impl InvalidationReason {
    fn label(&self) -> &'static str {
        match self {
            Self::PostCreated { .. } => "post_created",
            Self::PostUpdated { .. } => "post_updated",
            Self::CommentCreated { .. } => "comment_created",
        }
    }
}

/// Clears the page cache after content changes.
///
/// Every post or comment write clears the whole store, not just the pages
/// that show the changed content.
#[derive(Clone)]
pub struct CacheTrigger {
    config: CacheConfig,
    store: Arc<PageStore>,
}

impl CacheTrigger {
    pub fn new(config: CacheConfig, store: Arc<PageStore>) -> Self {
        Self { config, store }
    }

    pub fn content_changed(&self, reason: InvalidationReason) {
        if !self.config.enabled {
            debug!(?reason, "Cache invalidation skipped: cache disabled");
            return;
        }

        let removed = self.store.clear();
        counter!(METRIC_PAGE_CACHE_INVALIDATE, "reason" => reason.label()).increment(1);
        debug!(?reason, removed, "Cleared page cache");
    }

    pub fn post_created(&self, post_id: i64) {
        self.content_changed(InvalidationReason::PostCreated { post_id });
    }

    pub fn post_updated(&self, post_id: i64) {
        self.content_changed(InvalidationReason::PostUpdated { post_id });
    }

    pub fn comment_created(&self, post_id: i64) {
        self.content_changed(InvalidationReason::CommentCreated { post_id });
    }
}
