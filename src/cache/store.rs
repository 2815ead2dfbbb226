//! In-memory storage for rendered pages.

use std::sync::Mutex;
use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::Response,
};
use bytes::Bytes;
use http_body_util::BodyExt;
use lru::LruCache;
use thiserror::Error;
use tokio::time::Instant;

use super::config::CacheConfig;
use super::keys::PageKey;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::store";

/// A fully buffered response that can be replayed any number of times.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    status: StatusCode,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Bytes,
}

impl CachedResponse {
    pub fn new(status: StatusCode, headers: &HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers: headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            body,
        }
    }

    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        headers.clear();
        for (name, value) in self.headers {
            headers.append(name, value);
        }

        response
    }
}

#[derive(Debug, Error)]
pub enum CacheStoreError {
    #[error("failed to buffer response body: {0}")]
    Buffer(String),
}

/// Collect a response body so it can be both stored and returned.
pub(crate) async fn buffer_response(
    response: Response,
) -> Result<(Response, CachedResponse), (Response, CacheStoreError)> {
    let (parts, body) = response.into_parts();
    match BodyExt::collect(body).await {
        Ok(collected) => {
            let bytes = collected.to_bytes();
            let cached = CachedResponse::new(parts.status, &parts.headers, bytes.clone());
            Ok((Response::from_parts(parts, Body::from(bytes)), cached))
        }
        Err(error) => {
            let rebuilt = Response::from_parts(parts, Body::empty());
            Err((rebuilt, CacheStoreError::Buffer(error.to_string())))
        }
    }
}

struct StoredPage {
    response: CachedResponse,
    stored_at: Instant,
}

/// Process-wide LRU of rendered pages with a fixed time-to-live.
///
/// Expired entries are dropped lazily on lookup.
pub struct PageStore {
    entries: Mutex<LruCache<PageKey, StoredPage>>,
    ttl: Duration,
}

impl PageStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.max_entries_non_zero())),
            ttl: config.index_ttl,
        }
    }

    /// Return the stored response for `key` unless it has outlived the TTL.
    pub fn get(&self, key: &PageKey) -> Option<CachedResponse> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");
        let expired = match entries.get(key) {
            Some(page) if page.stored_at.elapsed() < self.ttl => {
                return Some(page.response.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    /// Store a response. Returns the key evicted for capacity, if any.
    pub fn put(&self, key: PageKey, response: CachedResponse) -> Option<PageKey> {
        let page = StoredPage {
            response,
            stored_at: Instant::now(),
        };
        mutex_lock(&self.entries, SOURCE, "put")
            .push(key.clone(), page)
            .and_then(|(evicted, _)| (evicted != key).then_some(evicted))
    }

    /// Drop every entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut entries = mutex_lock(&self.entries, SOURCE, "clear");
        let removed = entries.len();
        entries.clear();
        removed
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
