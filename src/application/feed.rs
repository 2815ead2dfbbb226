//! Feed resolution: which posts a page shows, in which order.

use std::num::NonZeroU32;
use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;

use crate::application::auth::Viewer;
use crate::application::pagination::{Page, PageRequest};
use crate::application::repos::{
    CommentsRepo, GroupsRepo, PostScope, PostsRepo, RepoError, UsersRepo,
};
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord, UserRecord};

pub const DEFAULT_PAGE_SIZE: NonZeroU32 = match NonZeroU32::new(5) {
    Some(size) => size,
    None => unreachable!(),
};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    #[error("feed requires a signed-in viewer")]
    Unauthorized,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct GroupFeed {
    pub group: GroupRecord,
    pub page: Page<PostRecord>,
}

#[derive(Debug, Clone)]
pub struct ProfileFeed {
    pub author: UserRecord,
    pub page: Page<PostRecord>,
}

#[derive(Debug, Clone)]
pub struct PostDetail {
    pub author: UserRecord,
    pub post: PostRecord,
    pub comments: Vec<CommentRecord>,
}

#[derive(Clone)]
pub struct FeedService {
    posts: Arc<dyn PostsRepo>,
    users: Arc<dyn UsersRepo>,
    groups: Arc<dyn GroupsRepo>,
    comments: Arc<dyn CommentsRepo>,
    page_size: NonZeroU32,
}

impl FeedService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        users: Arc<dyn UsersRepo>,
        groups: Arc<dyn GroupsRepo>,
        comments: Arc<dyn CommentsRepo>,
    ) -> Self {
        Self {
            posts,
            users,
            groups,
            comments,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: NonZeroU32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Every post, newest first.
    #[instrument(skip(self))]
    pub async fn global_feed(&self, page: PageRequest) -> Result<Page<PostRecord>, FeedError> {
        self.paginate(PostScope::All, page).await
    }

    #[instrument(skip(self))]
    pub async fn group_feed(&self, slug: &str, page: PageRequest) -> Result<GroupFeed, FeedError> {
        let group = self
            .groups
            .find_by_slug(slug)
            .await?
            .ok_or(FeedError::NotFound { entity: "group" })?;
        let page = self.paginate(PostScope::Group(group.id), page).await?;
        Ok(GroupFeed { group, page })
    }

    #[instrument(skip(self))]
    pub async fn profile_feed(
        &self,
        username: &str,
        page: PageRequest,
    ) -> Result<ProfileFeed, FeedError> {
        let author = self.find_author(username).await?;
        let page = self.paginate(PostScope::Author(author.id), page).await?;
        Ok(ProfileFeed { author, page })
    }

    /// Posts by authors the viewer follows. Empty when they follow nobody.
    #[instrument(skip(self, viewer), fields(viewer = ?viewer.user_id()))]
    pub async fn follow_feed(
        &self,
        viewer: &Viewer,
        page: PageRequest,
    ) -> Result<Page<PostRecord>, FeedError> {
        let user_id = viewer.user_id().ok_or(FeedError::Unauthorized)?;
        self.paginate(PostScope::FollowedBy(user_id), page).await
    }

    /// A single post with its comments. The post must belong to `username`.
    #[instrument(skip(self))]
    pub async fn post_detail(&self, username: &str, post_id: i64) -> Result<PostDetail, FeedError> {
        let (author, post) = self.find_authored_post(username, post_id).await?;
        let comments = self.comments.list_for_post(post.id).await?;
        Ok(PostDetail {
            author,
            post,
            comments,
        })
    }

    /// Resolve `/<username>/<post_id>/` to the author and the post.
    pub async fn find_authored_post(
        &self,
        username: &str,
        post_id: i64,
    ) -> Result<(UserRecord, PostRecord), FeedError> {
        let author = self.find_author(username).await?;
        let post = self
            .posts
            .find_post(post_id)
            .await?
            .filter(|post| post.author.id == author.id)
            .ok_or(FeedError::NotFound { entity: "post" })?;
        Ok((author, post))
    }

    async fn find_author(&self, username: &str) -> Result<UserRecord, FeedError> {
        self.users
            .find_by_username(username)
            .await?
            .ok_or(FeedError::NotFound { entity: "user" })
    }

    async fn paginate(
        &self,
        scope: PostScope,
        request: PageRequest,
    ) -> Result<Page<PostRecord>, FeedError> {
        let total = self.posts.count_posts(scope).await?;
        let window = request.resolve(total, self.page_size);
        let items = if total == 0 {
            Vec::new()
        } else {
            self.posts
                .list_posts(scope, window.limit, window.offset)
                .await?
        };
        Ok(Page::new(items, window))
    }
}
