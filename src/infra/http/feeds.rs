//! Read-only pages: feeds, profiles, post detail, plus follow toggles.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;

use crate::{
    application::{
        auth::Viewer, error::HttpError, feed::PostDetail, pagination::PageRequest,
        profile::AuthorSummary,
    },
    presentation::views::{
        AuthorCardView, CommentFormView, CommentView, FeedView, FollowTemplate, GroupPageView,
        GroupTemplate, IndexTemplate, LayoutChrome, LayoutContext, PostCard, PostDetailView,
        PostTemplate, ProfilePageView, ProfileTemplate, group_href, login_redirect_href,
        profile_href, render_template_response,
    },
};

use super::{CurrentUser, HttpState, found, parse_post_id};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct PageQuery {
    page: Option<String>,
}

impl PageQuery {
    fn request(&self) -> PageRequest {
        PageRequest::from_query(self.page.as_deref())
    }
}

pub(super) fn chrome(state: &HttpState, viewer: &Viewer, current_path: &str) -> LayoutChrome {
    LayoutChrome::new(viewer, &state.auth_settings.login_path, current_path)
}

pub(super) async fn index(
    State(state): State<HttpState>,
    viewer: Viewer,
    Query(query): Query<PageQuery>,
) -> Result<Response, HttpError> {
    let page = state.feed.global_feed(query.request()).await?;
    let content = FeedView::new(&page, &viewer, "/");
    let view = LayoutContext::new(chrome(&state, &viewer, "/"), content);
    Ok(render_template_response(IndexTemplate { view }, StatusCode::OK))
}

pub(super) async fn follow_index(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<PageQuery>,
) -> Result<Response, HttpError> {
    let viewer = Viewer::User(user);
    let page = state.feed.follow_feed(&viewer, query.request()).await?;
    let content = FeedView::new(&page, &viewer, "/follow/");
    let view = LayoutContext::new(chrome(&state, &viewer, "/follow/"), content);
    Ok(render_template_response(FollowTemplate { view }, StatusCode::OK))
}

pub(super) async fn group_posts(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response, HttpError> {
    let feed = state.feed.group_feed(&slug, query.request()).await?;
    let base = group_href(&feed.group.slug);
    let content = GroupPageView::new(&feed.group, FeedView::new(&feed.page, &viewer, &base));
    let view = LayoutContext::new(chrome(&state, &viewer, &base), content);
    Ok(render_template_response(GroupTemplate { view }, StatusCode::OK))
}

pub(super) async fn profile(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response, HttpError> {
    let feed = state.feed.profile_feed(&username, query.request()).await?;
    let summary = state.profiles.author_summary(&feed.author, &viewer).await?;
    let base = profile_href(&feed.author.username);
    let content = ProfilePageView {
        author: AuthorCardView::from(summary),
        feed: FeedView::new(&feed.page, &viewer, &base),
    };
    let view = LayoutContext::new(chrome(&state, &viewer, &base), content);
    Ok(render_template_response(ProfileTemplate { view }, StatusCode::OK))
}

pub(super) async fn post_detail(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path((username, post_id)): Path<(String, String)>,
) -> Result<Response, HttpError> {
    let post_id = parse_post_id(&post_id)?;
    let detail = state.feed.post_detail(&username, post_id).await?;
    let summary = state.profiles.author_summary(&detail.author, &viewer).await?;
    Ok(render_post_detail(&state, &viewer, detail, summary, None))
}

/// Render the detail page. `rejected_comment` carries a comment that failed
/// validation so the form can show it with its errors.
pub(super) fn render_post_detail(
    state: &HttpState,
    viewer: &Viewer,
    detail: PostDetail,
    summary: AuthorSummary,
    rejected_comment: Option<(String, Vec<String>)>,
) -> Response {
    let post = PostCard::from_record(&detail.post, viewer);
    let current_path = post.href.clone();
    let comment_form = viewer.is_authenticated().then(|| {
        let (text, text_errors) = rejected_comment.unwrap_or_default();
        CommentFormView {
            action: format!("{}comment/", post.href),
            text,
            text_errors,
        }
    });
    let content = PostDetailView {
        author: AuthorCardView::from(summary),
        comments: detail.comments.iter().map(CommentView::from).collect(),
        comment_form,
        login_href: login_redirect_href(&state.auth_settings.login_path, &current_path),
        post,
    };
    let view = LayoutContext::new(chrome(state, viewer, &current_path), content);
    render_template_response(PostTemplate { view }, StatusCode::OK)
}

pub(super) async fn follow_author(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    Path(username): Path<String>,
) -> Result<Response, HttpError> {
    state.follows.follow(&user, &username).await?;
    Ok(found(&profile_href(&username)))
}

pub(super) async fn unfollow_author(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    Path(username): Path<String>,
) -> Result<Response, HttpError> {
    state.follows.unfollow(&user, &username).await?;
    Ok(found(&profile_href(&username)))
}
