//! Community groups.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::repos::{CreateGroupParams, GroupsRepo, RepoError};
use crate::domain::entities::GroupRecord;
use crate::domain::slug::{SlugError, derive_slug, ensure_slug};

#[derive(Debug, Error)]
pub enum GroupError {
    #[error("group title must not be empty")]
    EmptyTitle,
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error("group slug `{0}` is already taken")]
    SlugTaken(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct CreateGroupCommand {
    pub title: String,
    /// Explicit slug; derived from the title when absent.
    pub slug: Option<String>,
    pub description: String,
}

#[derive(Clone)]
pub struct GroupService {
    repo: Arc<dyn GroupsRepo>,
}

impl GroupService {
    pub fn new(repo: Arc<dyn GroupsRepo>) -> Self {
        Self { repo }
    }

    pub async fn create_group(&self, cmd: CreateGroupCommand) -> Result<GroupRecord, GroupError> {
        let title = cmd.title.trim();
        if title.is_empty() {
            return Err(GroupError::EmptyTitle);
        }

        let slug = match cmd.slug.as_deref() {
            Some(explicit) => ensure_slug(explicit)?,
            None => derive_slug(title)?,
        };

        let group = self
            .repo
            .create_group(CreateGroupParams {
                title: title.to_string(),
                slug: slug.clone(),
                description: cmd.description.trim().to_string(),
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => GroupError::SlugTaken(slug),
                other => GroupError::Repo(other),
            })?;

        info!(group_id = group.id, slug = %group.slug, "Created group");
        Ok(group)
    }
}
