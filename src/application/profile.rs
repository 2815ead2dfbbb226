//! Author summary card shown on profile and post pages.

use std::sync::Arc;

use crate::application::auth::Viewer;
use crate::application::follows::{FollowError, FollowService};
use crate::application::repos::{AuthorStats, UsersRepo};
use crate::domain::entities::UserRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorSummary {
    pub username: String,
    pub display_name: String,
    pub stats: AuthorStats,
    /// Whether to show a follow/unfollow button at all.
    pub can_follow: bool,
    pub viewer_follows: bool,
}

#[derive(Clone)]
pub struct ProfileService {
    users: Arc<dyn UsersRepo>,
    follows: FollowService,
}

impl ProfileService {
    pub fn new(users: Arc<dyn UsersRepo>, follows: FollowService) -> Self {
        Self { users, follows }
    }

    pub async fn author_summary(
        &self,
        author: &UserRecord,
        viewer: &Viewer,
    ) -> Result<AuthorSummary, FollowError> {
        let stats = self.users.author_stats(author.id).await?;
        let (can_follow, viewer_follows) = match viewer.user_id() {
            Some(viewer_id) if viewer_id != author.id => {
                (true, self.follows.is_following(viewer_id, author.id).await?)
            }
            _ => (false, false),
        };

        Ok(AuthorSummary {
            username: author.username.clone(),
            display_name: author.display_name(),
            stats,
            can_follow,
            viewer_follows,
        })
    }
}
