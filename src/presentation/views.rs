use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use thiserror::Error;
use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};

use crate::application::auth::Viewer;
use crate::application::error::{ErrorReport, HttpError};
use crate::application::pagination::Page;
use crate::application::posts::FormErrors;
use crate::application::profile::AuthorSummary;
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord};

const DISPLAY_DATE: &[BorrowedFormatItem<'static>] =
    format_description!("[day] [month repr:short] [year] [hour]:[minute]");
const ISO_DATE: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");
/// Unreserved characters and `/` stay literal in a `next` value.
const NEXT_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');
const MEDIA_URL_PREFIX: &str = "/media/";
const SITE_TITLE: &str = "Scribbly";

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, TemplateRenderError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => {
            let mut response =
                (StatusCode::INTERNAL_SERVER_ERROR, err.public_message).into_response();
            ErrorReport::from_error(err.source, StatusCode::INTERNAL_SERVER_ERROR, &err)
                .attach(&mut response);
            response
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        HttpError::from_error(
            err.source,
            StatusCode::INTERNAL_SERVER_ERROR,
            err.public_message,
            &err,
        )
    }
}

/// Render the not-found or server-error page. Error pages never know the
/// viewer, so they always show the anonymous navigation.
pub fn render_error_page(status: StatusCode, message: &str) -> Response {
    let chrome = LayoutChrome::anonymous("/");
    if status == StatusCode::NOT_FOUND {
        let view = LayoutContext::new(chrome, ErrorPageView::not_found());
        render_template_response(NotFoundTemplate { view }, status)
    } else {
        let view = LayoutContext::new(chrome, ErrorPageView::server_error(status, message));
        render_template_response(ServerErrorTemplate { view }, status)
    }
}

// ============================================================================
// Layout
// ============================================================================

#[derive(Clone)]
pub struct NavigationView {
    pub signed_in_as: Option<String>,
    pub profile_href: Option<String>,
    pub login_href: String,
}

#[derive(Clone)]
pub struct LayoutChrome {
    pub site_title: &'static str,
    pub navigation: NavigationView,
}

impl LayoutChrome {
    pub fn new(viewer: &Viewer, login_path: &str, current_path: &str) -> Self {
        let login_href = login_redirect_href(login_path, current_path);
        let navigation = match viewer.user() {
            Some(user) => NavigationView {
                signed_in_as: Some(user.display_name()),
                profile_href: Some(profile_href(&user.username)),
                login_href,
            },
            None => NavigationView {
                signed_in_as: None,
                profile_href: None,
                login_href,
            },
        };
        Self {
            site_title: SITE_TITLE,
            navigation,
        }
    }

    pub fn anonymous(current_path: &str) -> Self {
        Self::new(&Viewer::Anonymous, "/auth/login/", current_path)
    }
}

pub struct LayoutContext<T> {
    pub site_title: &'static str,
    pub navigation: NavigationView,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(chrome: LayoutChrome, content: T) -> Self {
        Self {
            site_title: chrome.site_title,
            navigation: chrome.navigation,
            content,
        }
    }
}

// ============================================================================
// Links
// ============================================================================

pub fn profile_href(username: &str) -> String {
    format!("/{username}/")
}

pub fn post_href(username: &str, post_id: i64) -> String {
    format!("/{username}/{post_id}/")
}

pub fn group_href(slug: &str) -> String {
    format!("/group/{slug}/")
}

pub fn media_href(stored_path: &str) -> String {
    format!("{MEDIA_URL_PREFIX}{stored_path}")
}

/// `login_path?next=<current_path>`, with `next` percent-encoded.
pub fn login_redirect_href(login_path: &str, current_path: &str) -> String {
    format!("{login_path}?next={}", utf8_percent_encode(current_path, NEXT_VALUE))
}

pub fn format_display_date(value: OffsetDateTime) -> String {
    value
        .format(DISPLAY_DATE)
        .unwrap_or_else(|_| value.date().to_string())
}

fn format_iso_date(value: OffsetDateTime) -> String {
    value
        .to_offset(time::UtcOffset::UTC)
        .format(ISO_DATE)
        .unwrap_or_default()
}

// ============================================================================
// Cards
// ============================================================================

#[derive(Clone)]
pub struct GroupBadge {
    pub title: String,
    pub href: String,
}

#[derive(Clone)]
pub struct PostCard {
    pub id: i64,
    pub text: String,
    pub href: String,
    pub author_name: String,
    pub author_href: String,
    pub published: String,
    pub iso_date: String,
    pub group: Option<GroupBadge>,
    pub image_url: Option<String>,
    pub edit_href: Option<String>,
}

impl PostCard {
    pub fn from_record(post: &PostRecord, viewer: &Viewer) -> Self {
        let href = post_href(&post.author.username, post.id);
        let edit_href = (viewer.user_id() == Some(post.author.id)).then(|| format!("{href}edit/"));
        Self {
            id: post.id,
            text: post.text.clone(),
            author_name: post.author.display_name.clone(),
            author_href: profile_href(&post.author.username),
            published: format_display_date(post.pub_date),
            iso_date: format_iso_date(post.pub_date),
            group: post.group.as_ref().map(|group| GroupBadge {
                title: group.title.clone(),
                href: group_href(&group.slug),
            }),
            image_url: post.image.as_deref().map(media_href),
            edit_href,
            href,
        }
    }
}

pub struct CommentView {
    pub text: String,
    pub author_name: String,
    pub author_href: String,
    pub created: String,
}

impl From<&CommentRecord> for CommentView {
    fn from(comment: &CommentRecord) -> Self {
        Self {
            text: comment.text.clone(),
            author_name: comment.author.display_name.clone(),
            author_href: profile_href(&comment.author.username),
            created: format_display_date(comment.created),
        }
    }
}

pub struct AuthorCardView {
    pub display_name: String,
    pub username: String,
    pub href: String,
    pub posts: u64,
    pub followers: u64,
    pub following: u64,
    pub follow_href: Option<String>,
    pub unfollow_href: Option<String>,
}

impl From<AuthorSummary> for AuthorCardView {
    fn from(summary: AuthorSummary) -> Self {
        let href = profile_href(&summary.username);
        let (follow_href, unfollow_href) = match (summary.can_follow, summary.viewer_follows) {
            (true, true) => (None, Some(format!("{href}unfollow/"))),
            (true, false) => (Some(format!("{href}follow/")), None),
            (false, _) => (None, None),
        };
        Self {
            display_name: summary.display_name,
            username: summary.username,
            posts: summary.stats.posts,
            followers: summary.stats.followers,
            following: summary.stats.following,
            follow_href,
            unfollow_href,
            href,
        }
    }
}

// ============================================================================
// Pagination
// ============================================================================

pub struct PageLink {
    pub number: u64,
    pub href: String,
    pub is_current: bool,
}

pub struct PaginatorView {
    pub number: u64,
    pub num_pages: u64,
    pub previous_href: Option<String>,
    pub next_href: Option<String>,
    pub pages: Vec<PageLink>,
}

impl PaginatorView {
    pub fn new<T>(page: &Page<T>, base_path: &str) -> Self {
        let href = |number: u64| format!("{base_path}?page={number}");
        Self {
            number: page.number,
            num_pages: page.num_pages,
            previous_href: page.previous_number().map(href),
            next_href: page.next_number().map(href),
            pages: (1..=page.num_pages)
                .map(|number| PageLink {
                    number,
                    href: href(number),
                    is_current: number == page.number,
                })
                .collect(),
        }
    }

    pub fn is_paginated(&self) -> bool {
        self.num_pages > 1
    }
}

// ============================================================================
// Feed pages
// ============================================================================

pub struct FeedView {
    pub posts: Vec<PostCard>,
    pub paginator: PaginatorView,
}

impl FeedView {
    pub fn new(page: &Page<PostRecord>, viewer: &Viewer, base_path: &str) -> Self {
        Self {
            posts: page
                .items
                .iter()
                .map(|post| PostCard::from_record(post, viewer))
                .collect(),
            paginator: PaginatorView::new(page, base_path),
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: LayoutContext<FeedView>,
}

#[derive(Template)]
#[template(path = "follow.html")]
pub struct FollowTemplate {
    pub view: LayoutContext<FeedView>,
}

impl IndexTemplate {
    fn feed(&self) -> &FeedView {
        &self.view.content
    }
}

impl FollowTemplate {
    fn feed(&self) -> &FeedView {
        &self.view.content
    }
}

pub struct GroupPageView {
    pub title: String,
    pub description: String,
    pub feed: FeedView,
}

impl GroupPageView {
    pub fn new(group: &GroupRecord, feed: FeedView) -> Self {
        Self {
            title: group.title.clone(),
            description: group.description.clone(),
            feed,
        }
    }
}

#[derive(Template)]
#[template(path = "group.html")]
pub struct GroupTemplate {
    pub view: LayoutContext<GroupPageView>,
}

impl GroupTemplate {
    fn feed(&self) -> &FeedView {
        &self.view.content.feed
    }
}

pub struct ProfilePageView {
    pub author: AuthorCardView,
    pub feed: FeedView,
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub view: LayoutContext<ProfilePageView>,
}

impl ProfileTemplate {
    fn feed(&self) -> &FeedView {
        &self.view.content.feed
    }

    fn author(&self) -> &AuthorCardView {
        &self.view.content.author
    }
}

// ============================================================================
// Post detail and forms
// ============================================================================

pub struct CommentFormView {
    pub action: String,
    pub text: String,
    pub text_errors: Vec<String>,
}

pub struct PostDetailView {
    pub post: PostCard,
    pub author: AuthorCardView,
    pub comments: Vec<CommentView>,
    /// Present only for signed-in viewers.
    pub comment_form: Option<CommentFormView>,
    pub login_href: String,
}

#[derive(Template)]
#[template(path = "post.html")]
pub struct PostTemplate {
    pub view: LayoutContext<PostDetailView>,
}

impl PostTemplate {
    fn author(&self) -> &AuthorCardView {
        &self.view.content.author
    }
}

pub struct GroupChoice {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

pub struct PostFormView {
    pub is_edit: bool,
    pub action: String,
    pub text: String,
    pub groups: Vec<GroupChoice>,
    pub current_image: Option<String>,
    pub text_errors: Vec<String>,
    pub group_errors: Vec<String>,
    pub image_errors: Vec<String>,
}

impl PostFormView {
    pub fn new(action: String, groups: &[GroupRecord]) -> Self {
        Self {
            is_edit: false,
            action,
            text: String::new(),
            groups: group_choices(groups, ""),
            current_image: None,
            text_errors: Vec::new(),
            group_errors: Vec::new(),
            image_errors: Vec::new(),
        }
    }

    pub fn for_post(post: &PostRecord, groups: &[GroupRecord]) -> Self {
        let selected = post
            .group
            .as_ref()
            .map(|group| group.id.to_string())
            .unwrap_or_default();
        Self {
            is_edit: true,
            action: format!("{}edit/", post_href(&post.author.username, post.id)),
            text: post.text.clone(),
            groups: group_choices(groups, &selected),
            current_image: post.image.as_deref().map(media_href),
            text_errors: Vec::new(),
            group_errors: Vec::new(),
            image_errors: Vec::new(),
        }
    }

    /// Keep what the user typed and attach field errors.
    pub fn with_submission(mut self, text: &str, group: &str, errors: &FormErrors) -> Self {
        self.text = text.to_string();
        for choice in &mut self.groups {
            choice.selected = choice.value == group.trim();
        }
        self.text_errors = owned(errors.for_field("text"));
        self.group_errors = owned(errors.for_field("group"));
        self.image_errors = owned(errors.for_field("image"));
        self
    }
}

fn owned(messages: Vec<&str>) -> Vec<String> {
    messages.into_iter().map(str::to_string).collect()
}

fn group_choices(groups: &[GroupRecord], selected: &str) -> Vec<GroupChoice> {
    std::iter::once(GroupChoice {
        value: String::new(),
        label: "---------".to_string(),
        selected: selected.is_empty(),
    })
    .chain(groups.iter().map(|group| {
        let value = group.id.to_string();
        GroupChoice {
            selected: value == selected,
            label: group.title.clone(),
            value,
        }
    }))
    .collect()
}

#[derive(Template)]
#[template(path = "new.html")]
pub struct PostFormTemplate {
    pub view: LayoutContext<PostFormView>,
}

pub struct LoginView {
    pub action: String,
    pub username: String,
    pub next: String,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub view: LayoutContext<LoginView>,
}

// ============================================================================
// Errors
// ============================================================================

pub struct ErrorPageView {
    pub title: String,
    pub message: String,
}

impl ErrorPageView {
    pub fn not_found() -> Self {
        Self {
            title: "Page not found".to_string(),
            message: "The page you requested does not exist.".to_string(),
        }
    }

    pub fn server_error(status: StatusCode, message: &str) -> Self {
        Self {
            title: format!("Error {}", status.as_u16()),
            message: message.to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "misc/404.html")]
pub struct NotFoundTemplate {
    pub view: LayoutContext<ErrorPageView>,
}

#[derive(Template)]
#[template(path = "misc/500.html")]
pub struct ServerErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}
