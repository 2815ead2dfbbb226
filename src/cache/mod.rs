//! Index page cache.
//!
//! The rendered global feed is kept in a process-wide LRU for a short TTL and
//! dropped wholesale whenever a post or comment is written:
//!
//! - [`PageStore`] holds buffered responses with their store time
//! - [`page_cache_layer`] serves hits and stores cacheable misses
//! - [`CacheTrigger`] is what write services call after a successful mutation

mod config;
mod keys;
mod lock;
mod middleware;
mod store;
mod trigger;

pub use config::CacheConfig;
pub use keys::PageKey;
pub use middleware::{PageCacheState, page_cache_layer};
pub use store::{CachedResponse, PageStore};
pub use trigger::{CacheTrigger, InvalidationReason};

pub const METRIC_PAGE_CACHE_HIT: &str = "scribbly_page_cache_hit_total";
pub const METRIC_PAGE_CACHE_MISS: &str = "scribbly_page_cache_miss_total";
pub const METRIC_PAGE_CACHE_STORE: &str = "scribbly_page_cache_store_total";
pub const METRIC_PAGE_CACHE_INVALIDATE: &str = "scribbly_page_cache_invalidate_total";
