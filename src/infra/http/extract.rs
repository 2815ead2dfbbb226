//! Request extractors shared by the public handlers.

use std::convert::Infallible;

use axum::{
    Form,
    extract::{FromRequest, FromRequestParts, Request},
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use axum_extra::extract::Multipart;
use bytes::Bytes;
use serde::Deserialize;
use tracing::warn;

use crate::{
    application::{
        auth::Viewer,
        error::HttpError,
        posts::{ImageUpload, PostDraft},
    },
    domain::entities::UserRecord,
    presentation::views::login_redirect_href,
};

use super::HttpState;

const SOURCE: &str = "infra::http::extract";

/// `302 Found` to `location`.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Only local absolute paths are accepted as a post-login target.
pub fn safe_next(next: Option<&str>) -> &str {
    match next.map(str::trim) {
        Some(path)
            if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') =>
        {
            path
        }
        _ => "/",
    }
}

impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Viewer>().cloned().unwrap_or_default())
    }
}

/// A signed-in user. Anonymous requests are redirected to the login page
/// with the current path as `next`.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserRecord);

impl FromRequestParts<HttpState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &HttpState,
    ) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<Viewer>().and_then(Viewer::user) {
            Some(user) => Ok(CurrentUser(user.clone())),
            None => {
                let current = parts
                    .uri
                    .path_and_query()
                    .map(|value| value.as_str())
                    .unwrap_or("/");
                Err(found(&login_redirect_href(
                    &state.auth_settings.login_path,
                    current,
                )))
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UrlencodedPost {
    text: String,
    group: String,
}

/// The post form, submitted either as `multipart/form-data` (with an
/// optional `image` file) or urlencoded.
#[derive(Debug, Default)]
pub struct PostForm(pub PostDraft);

impl<S> FromRequest<S> for PostForm
where
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("multipart/form-data"));

        if is_multipart {
            let mut multipart = Multipart::from_request(request, state)
                .await
                .map_err(|err| {
                    HttpError::new(
                        SOURCE,
                        StatusCode::BAD_REQUEST,
                        "Invalid form submission",
                        err.to_string(),
                    )
                })?;
            return read_multipart(&mut multipart).await.map(PostForm);
        }

        let Form(form) = Form::<UrlencodedPost>::from_request(request, state)
            .await
            .map_err(|err| {
                HttpError::new(
                    SOURCE,
                    StatusCode::BAD_REQUEST,
                    "Invalid form submission",
                    err.body_text(),
                )
            })?;
        Ok(PostForm(PostDraft {
            text: form.text,
            group: form.group,
            image: None,
        }))
    }
}

async fn read_multipart(multipart: &mut Multipart) -> Result<PostDraft, HttpError> {
    let mut draft = PostDraft::default();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                let status = err.status();
                warn!(
                    status = status.as_u16(),
                    error = %err,
                    "failed to read multipart payload"
                );
                let public_message = if status == StatusCode::PAYLOAD_TOO_LARGE {
                    "Upload too large"
                } else {
                    "Invalid form submission"
                };
                return Err(HttpError::new(SOURCE, status, public_message, err.to_string()));
            }
        };

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("text") => draft.text = read_text(field.text().await)?,
            Some("group") => draft.group = read_text(field.text().await)?,
            Some("image") => {
                let file_name = field
                    .file_name()
                    .map(|value| value.trim().to_string())
                    .unwrap_or_default();
                let content_type = field.content_type().map(|mime| mime.to_string());
                let data = read_bytes(field.bytes().await)?;
                // Browsers send an empty part when no file was chosen.
                if !file_name.is_empty() || !data.is_empty() {
                    draft.image = Some(ImageUpload {
                        file_name,
                        content_type,
                        data,
                    });
                }
            }
            _ => continue,
        }
    }
    Ok(draft)
}

fn read_text<E: std::fmt::Display>(value: Result<String, E>) -> Result<String, HttpError> {
    value.map_err(|err| {
        HttpError::new(
            SOURCE,
            StatusCode::BAD_REQUEST,
            "Invalid form submission",
            err.to_string(),
        )
    })
}

fn read_bytes<E: std::fmt::Display>(value: Result<Bytes, E>) -> Result<Bytes, HttpError> {
    value.map_err(|err| {
        HttpError::new(
            SOURCE,
            StatusCode::BAD_REQUEST,
            "Invalid form submission",
            err.to_string(),
        )
    })
}
