use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::{
    auth::Viewer,
    error::ErrorReport,
};

use super::HttpState;

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

/// Turn the session cookie into a [`Viewer`] extension. Unknown or expired
/// tokens fall back to an anonymous viewer; a failing session lookup is
/// logged and treated the same way.
pub async fn resolve_viewer(
    State(state): State<HttpState>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let viewer = match jar.get(&state.auth_settings.session_cookie) {
        Some(cookie) => match state.auth.resolve(cookie.value()).await {
            Ok(Some(user)) => Viewer::User(user),
            Ok(None) => Viewer::Anonymous,
            Err(err) => {
                let report = ErrorReport::from_error(
                    "infra::http::resolve_viewer",
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &err,
                );
                warn!(
                    source = report.source,
                    chain = ?report.messages,
                    "session lookup failed; continuing as anonymous"
                );
                Viewer::Anonymous
            }
        },
        None => Viewer::Anonymous,
    };
    request.extensions_mut().insert(viewer);
    next.run(request).await
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let user = request
        .extensions()
        .get::<Viewer>()
        .and_then(|viewer| viewer.user().map(|user| user.username.clone()));

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                user = user.as_deref().unwrap_or(""),
                "request failed",
            );
        } else {
            warn!(
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                user = user.as_deref().unwrap_or(""),
                "client request error",
            );
        }
    }

    response
}
