//! Login and logout.

use axum::{
    Form,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use tracing::warn;

use crate::{
    application::{auth::AuthError, auth::Viewer, error::HttpError},
    presentation::views::{LayoutContext, LoginTemplate, LoginView, render_template_response},
};

use super::{HttpState, feeds::chrome, found, safe_next};

const INVALID_LOGIN: &str =
    "Please enter a correct username and password. Note that both fields may be case-sensitive.";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct NextQuery {
    next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct LoginForm {
    username: String,
    password: String,
    next: Option<String>,
}

pub(super) async fn login_form(
    State(state): State<HttpState>,
    viewer: Viewer,
    Query(query): Query<NextQuery>,
) -> Response {
    let next = safe_next(query.next.as_deref()).to_string();
    render_login(&state, &viewer, String::new(), next, None)
}

pub(super) async fn login(
    State(state): State<HttpState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, HttpError> {
    let next = safe_next(form.next.as_deref()).to_string();
    match state.auth.login(form.username.trim(), &form.password).await {
        Ok(issued) => {
            let cookie = Cookie::build((state.auth_settings.session_cookie.clone(), issued.token))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .expires(issued.expires_at);
            Ok((jar.add(cookie), found(&next)).into_response())
        }
        Err(AuthError::InvalidCredentials) => Ok(render_login(
            &state,
            &Viewer::Anonymous,
            form.username,
            next,
            Some(INVALID_LOGIN.to_string()),
        )),
        Err(err) => Err(err.into()),
    }
}

pub(super) async fn logout(State(state): State<HttpState>, jar: CookieJar) -> Response {
    let name = state.auth_settings.session_cookie.clone();
    if let Some(cookie) = jar.get(&name)
        && let Err(err) = state.auth.logout(cookie.value()).await
    {
        warn!(error = %err, "failed to delete session on logout");
    }
    let jar = jar.remove(Cookie::build(name).path("/"));
    (jar, found("/")).into_response()
}

fn render_login(
    state: &HttpState,
    viewer: &Viewer,
    username: String,
    next: String,
    error: Option<String>,
) -> Response {
    let content = LoginView {
        action: state.auth_settings.login_path.clone(),
        username,
        next,
        error,
    };
    let view = LayoutContext::new(
        chrome(state, viewer, &state.auth_settings.login_path),
        content,
    );
    render_template_response(LoginTemplate { view }, StatusCode::OK)
}
