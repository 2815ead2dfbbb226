mod auth;
mod extract;
mod feeds;
mod middleware;
mod posts;

pub use extract::{CurrentUser, PostForm, found, safe_next};
pub use middleware::{RequestContext, log_responses, resolve_viewer, set_request_context};

use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State},
    http::{StatusCode, Uri},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use sqlx::Error as SqlxError;

use crate::{
    application::{
        auth::AuthService,
        error::{ErrorReport, HttpError},
        feed::FeedService,
        follows::FollowService,
        posts::PostService,
        profile::ProfileService,
    },
    cache::{PageCacheState, page_cache_layer},
    config::AuthSettings,
    infra::db::PostgresRepositories,
};

#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub posts: Arc<PostService>,
    pub follows: Arc<FollowService>,
    pub profiles: Arc<ProfileService>,
    pub auth: Arc<AuthService>,
    pub auth_settings: Arc<AuthSettings>,
    /// `None` when the index page cache is disabled.
    pub cache: Option<PageCacheState>,
    /// `None` in setups without a database pool; health checks then fail.
    pub db: Option<Arc<PostgresRepositories>>,
}

pub fn build_router(state: HttpState, max_request_bytes: usize) -> Router {
    // Only the global feed is cached. The layer sits inside `resolve_viewer`.
    let index = Router::new().route("/", get(feeds::index));
    let index = match state.cache.clone() {
        Some(cache) => index.route_layer(axum_middleware::from_fn_with_state(
            cache,
            page_cache_layer,
        )),
        None => index,
    };

    let pages = Router::new()
        .route("/follow/", get(feeds::follow_index))
        .route("/new/", get(posts::new_post).post(posts::create_post))
        .route("/group/{slug}/", get(feeds::group_posts))
        .route("/auth/login/", get(auth::login_form).post(auth::login))
        .route("/auth/logout/", get(auth::logout))
        .route("/_health/db", get(db_health))
        .route("/{username}/", get(feeds::profile))
        .route("/{username}/follow/", get(feeds::follow_author))
        .route("/{username}/unfollow/", get(feeds::unfollow_author))
        .route("/{username}/{post_id}/", get(feeds::post_detail))
        .route(
            "/{username}/{post_id}/edit/",
            get(posts::edit_post_form).post(posts::edit_post),
        )
        .route("/{username}/{post_id}/comment/", axum::routing::post(posts::add_comment));

    index
        .merge(pages)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            resolve_viewer,
        ))
        .layer(axum_middleware::from_fn(set_request_context))
        .with_state(state)
}

async fn not_found(uri: Uri) -> Response {
    HttpError::not_found("infra::http::fallback", format!("no route for {}", uri.path()))
        .into_response()
}

async fn db_health(State(state): State<HttpState>) -> Response {
    match state.db.as_ref() {
        Some(db) => db_health_response(db.health_check().await),
        None => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_message(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                "database pool not configured",
            )
            .attach(&mut response);
            response
        }
    }
}

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

/// Parse a post id path segment; anything that is not a number is a 404.
fn parse_post_id(raw: &str) -> Result<i64, HttpError> {
    raw.parse::<i64>().map_err(|_| {
        HttpError::not_found("infra::http::parse_post_id", format!("invalid post id `{raw}`"))
    })
}
