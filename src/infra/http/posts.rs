//! Post and comment forms.

use axum::{
    Form,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;

use crate::{
    application::{
        auth::Viewer,
        error::HttpError,
        posts::{FormErrors, PostDraft, PostError},
    },
    domain::entities::{GroupRecord, PostRecord, UserRecord},
    presentation::views::{
        LayoutContext, PostFormTemplate, PostFormView, post_href, render_template_response,
    },
};

use super::{
    CurrentUser, HttpState, PostForm,
    feeds::{chrome, render_post_detail},
    found, parse_post_id,
};

const NEW_POST_PATH: &str = "/new/";

pub(super) async fn new_post(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, HttpError> {
    let groups = state.posts.group_choices().await?;
    let form = PostFormView::new(NEW_POST_PATH.to_string(), &groups);
    Ok(render_form(&state, Viewer::User(user), NEW_POST_PATH, form))
}

pub(super) async fn create_post(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    PostForm(draft): PostForm,
) -> Result<Response, HttpError> {
    let submitted = Submitted::from(&draft);
    match state.posts.create_post(&user, draft).await {
        Ok(_) => Ok(found("/")),
        Err(PostError::Validation(errors)) => {
            let groups = state.posts.group_choices().await?;
            let form = PostFormView::new(NEW_POST_PATH.to_string(), &groups)
                .with_submission(&submitted.text, &submitted.group, &errors);
            Ok(render_form(&state, Viewer::User(user), NEW_POST_PATH, form))
        }
        Err(err) => Err(err.into()),
    }
}

pub(super) async fn edit_post_form(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    Path((username, post_id)): Path<(String, String)>,
) -> Result<Response, HttpError> {
    let post_id = parse_post_id(&post_id)?;
    match state.posts.editable_post(&user, &username, post_id).await {
        Ok(post) => {
            let groups = state.posts.group_choices().await?;
            let form = PostFormView::for_post(&post, &groups);
            let path = form.action.clone();
            Ok(render_form(&state, Viewer::User(user), &path, form))
        }
        Err(PostError::Forbidden { .. }) => Ok(found(&post_href(&username, post_id))),
        Err(err) => Err(err.into()),
    }
}

pub(super) async fn edit_post(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    Path((username, post_id)): Path<(String, String)>,
    PostForm(draft): PostForm,
) -> Result<Response, HttpError> {
    let post_id = parse_post_id(&post_id)?;
    let submitted = Submitted::from(&draft);
    match state.posts.update_post(&user, &username, post_id, draft).await {
        Ok(post) => Ok(found(&post_href(&post.author.username, post.id))),
        Err(PostError::Forbidden { .. }) => Ok(found(&post_href(&username, post_id))),
        Err(PostError::Validation(errors)) => {
            let post = state.posts.editable_post(&user, &username, post_id).await?;
            render_rejected_edit(&state, user, &post, &submitted, &errors).await
        }
        Err(err) => Err(err.into()),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct CommentForm {
    text: String,
}

pub(super) async fn add_comment(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    Path((username, post_id)): Path<(String, String)>,
    Form(form): Form<CommentForm>,
) -> Result<Response, HttpError> {
    let post_id = parse_post_id(&post_id)?;
    match state
        .posts
        .add_comment(&user, &username, post_id, &form.text)
        .await
    {
        Ok(_) => Ok(found(&post_href(&username, post_id))),
        Err(PostError::Validation(errors)) => {
            let viewer = Viewer::User(user);
            let detail = state.feed.post_detail(&username, post_id).await?;
            let summary = state.profiles.author_summary(&detail.author, &viewer).await?;
            let messages = errors
                .for_field("text")
                .into_iter()
                .map(str::to_string)
                .collect();
            Ok(render_post_detail(
                &state,
                &viewer,
                detail,
                summary,
                Some((form.text, messages)),
            ))
        }
        Err(err) => Err(err.into()),
    }
}

/// What the user typed, kept for re-rendering a rejected form.
struct Submitted {
    text: String,
    group: String,
}

impl From<&PostDraft> for Submitted {
    fn from(draft: &PostDraft) -> Self {
        Self {
            text: draft.text.clone(),
            group: draft.group.clone(),
        }
    }
}

async fn render_rejected_edit(
    state: &HttpState,
    user: UserRecord,
    post: &PostRecord,
    submitted: &Submitted,
    errors: &FormErrors,
) -> Result<Response, HttpError> {
    let groups: Vec<GroupRecord> = state.posts.group_choices().await?;
    let form = PostFormView::for_post(post, &groups).with_submission(
        &submitted.text,
        &submitted.group,
        errors,
    );
    let path = form.action.clone();
    Ok(render_form(state, Viewer::User(user), &path, form))
}

fn render_form(state: &HttpState, viewer: Viewer, path: &str, form: PostFormView) -> Response {
    let view = LayoutContext::new(chrome(state, &viewer, path), form);
    render_template_response(PostFormTemplate { view }, StatusCode::OK)
}
