//! Subscribing to and unsubscribing from authors.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::application::repos::{FollowsRepo, RepoError, UsersRepo};
use crate::domain::entities::UserRecord;
use crate::domain::follows::FollowEdge;

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("user `{0}` not found")]
    UnknownUser(String),
    #[error("not following `{0}`")]
    NotFollowing(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Result of a follow request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Created,
    AlreadyFollowing,
    SelfFollowIgnored,
}

#[derive(Clone)]
pub struct FollowService {
    follows: Arc<dyn FollowsRepo>,
    users: Arc<dyn UsersRepo>,
}

impl FollowService {
    pub fn new(follows: Arc<dyn FollowsRepo>, users: Arc<dyn UsersRepo>) -> Self {
        Self { follows, users }
    }

    /// Follow `target_username`. Repeating the call is harmless and following
    /// yourself does nothing.
    pub async fn follow(
        &self,
        user: &UserRecord,
        target_username: &str,
    ) -> Result<FollowOutcome, FollowError> {
        let author = self.find_target(target_username).await?;
        let Some(edge) = FollowEdge::new(user.id, author.id) else {
            debug!(user_id = user.id, "Ignored self-follow");
            return Ok(FollowOutcome::SelfFollowIgnored);
        };

        if self.follows.insert_follow(edge).await? {
            info!(user_id = user.id, author = %author.username, "Followed author");
            Ok(FollowOutcome::Created)
        } else {
            Ok(FollowOutcome::AlreadyFollowing)
        }
    }

    /// Remove the edge to `target_username`; fails if there is none.
    pub async fn unfollow(&self, user: &UserRecord, target_username: &str) -> Result<(), FollowError> {
        let author = self.find_target(target_username).await?;
        let edge = FollowEdge::new(user.id, author.id)
            .ok_or_else(|| FollowError::NotFollowing(author.username.clone()))?;

        if !self.follows.delete_follow(edge).await? {
            return Err(FollowError::NotFollowing(author.username));
        }

        info!(user_id = user.id, author = %author.username, "Unfollowed author");
        Ok(())
    }

    pub async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool, FollowError> {
        match FollowEdge::new(user_id, author_id) {
            Some(edge) => Ok(self.follows.find_follow(edge).await?.is_some()),
            None => Ok(false),
        }
    }

    async fn find_target(&self, username: &str) -> Result<UserRecord, FollowError> {
        self.users
            .find_by_username(username)
            .await?
            .ok_or_else(|| FollowError::UnknownUser(username.to_string()))
    }
}
