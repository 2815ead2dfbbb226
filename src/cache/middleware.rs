//! Page cache middleware.
//!
//! Serves stored copies of GET responses and stores cacheable misses. The
//! layer must run inside `resolve_viewer` so the viewer extension is present.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use metrics::counter;
use tracing::{debug, instrument, warn};

use crate::application::auth::Viewer;

use super::{
    CacheConfig, METRIC_PAGE_CACHE_HIT, METRIC_PAGE_CACHE_MISS, METRIC_PAGE_CACHE_STORE,
    PageStore,
    keys::PageKey,
    store::buffer_response,
};

/// Shared cache state for middleware.
#[derive(Clone)]
pub struct PageCacheState {
    pub config: CacheConfig,
    pub store: Arc<PageStore>,
}

#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn page_cache_layer(
    State(cache): State<PageCacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !cache.config.enabled || request.method() != Method::GET {
        return next.run(request).await;
    }

    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|value| value.as_str())
        .unwrap_or("/");
    let viewer = request
        .extensions()
        .get::<Viewer>()
        .and_then(Viewer::user_id);
    let key = PageKey::new(&cache.config.key_prefix, path_and_query, viewer);

    if let Some(cached) = cache.store.get(&key) {
        counter!(METRIC_PAGE_CACHE_HIT).increment(1);
        debug!(cache = "page", outcome = "hit", %key, "serving cached page");
        return cached.into_response();
    }

    counter!(METRIC_PAGE_CACHE_MISS).increment(1);
    debug!(cache = "page", outcome = "miss", %key, "rendering page");

    let response = next.run(request).await;
    if !should_store_response(&response) {
        return response;
    }

    match buffer_response(response).await {
        Ok((rebuilt, cached)) => {
            if let Some(evicted) = cache.store.put(key, cached) {
                debug!(cache = "page", %evicted, "evicted page for capacity");
            }
            counter!(METRIC_PAGE_CACHE_STORE).increment(1);
            rebuilt
        }
        Err((rebuilt, error)) => {
            warn!(error = %error, "Failed to buffer page for caching");
            rebuilt
        }
    }
}

/// Only plain `200 OK` responses that do not set cookies are worth replaying.
fn should_store_response(response: &Response) -> bool {
    response.status() == StatusCode::OK && !response.headers().contains_key(header::SET_COOKIE)
}
