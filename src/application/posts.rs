//! Writing posts and comments.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::{info, instrument};

use crate::application::repos::{
    CommentsRepo, CreateCommentParams, CreatePostParams, GroupsRepo, PostsRepo, PostsWriteRepo,
    RepoError, UpdatePostParams, UsersRepo,
};
use crate::cache::CacheTrigger;
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord, UserRecord};

pub const POST_TEXT_REQUIRED: &str = "Please insert record text";
pub const COMMENT_TEXT_REQUIRED: &str = "Please insert comment text";
pub const GROUP_INVALID_CHOICE: &str =
    "Select a valid choice. That choice is not one of the available choices.";
pub const IMAGE_INVALID: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";

/// An uploaded file as received from the form.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl ImageUpload {
    fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|value| value.trim().to_ascii_lowercase().starts_with("image/"))
    }
}

/// Fields submitted by the post form.
#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    pub text: String,
    /// Raw group choice; empty means "no group".
    pub group: String,
    pub image: Option<ImageUpload>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Inline errors to show next to form fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormErrors {
    errors: Vec<FieldError>,
}

impl FormErrors {
    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn for_field(&self, field: &str) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|error| error.field == field)
            .map(|error| error.message.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.errors.iter()
    }
}

impl std::fmt::Display for FormErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for error in &self.errors {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", error.field, error.message)?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ImageStoreError {
    #[error("uploaded file is empty")]
    Empty,
    #[error("image storage failed: {0}")]
    Storage(String),
}

/// Where post images end up. Returns the stored path relative to the media root.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn store_image(&self, file_name: &str, data: Bytes) -> Result<String, ImageStoreError>;
}

#[derive(Debug, Error)]
pub enum PostError {
    #[error("form is invalid: {0}")]
    Validation(FormErrors),
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    #[error("user {user_id} may not edit post {post_id}")]
    Forbidden { post_id: i64, user_id: i64 },
    #[error(transparent)]
    Image(#[from] ImageStoreError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct PostService {
    reader: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    comments: Arc<dyn CommentsRepo>,
    users: Arc<dyn UsersRepo>,
    groups: Arc<dyn GroupsRepo>,
    images: Arc<dyn ImageStore>,
    cache_trigger: Option<Arc<CacheTrigger>>,
}

impl PostService {
    pub fn new(
        reader: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        comments: Arc<dyn CommentsRepo>,
        users: Arc<dyn UsersRepo>,
        groups: Arc<dyn GroupsRepo>,
        images: Arc<dyn ImageStore>,
    ) -> Self {
        Self {
            reader,
            writer,
            comments,
            users,
            groups,
            images,
            cache_trigger: None,
        }
    }

    pub fn with_cache_trigger(mut self, trigger: Arc<CacheTrigger>) -> Self {
        self.cache_trigger = Some(trigger);
        self
    }

    /// Set the cache trigger for this service (optional).
    pub fn with_cache_trigger_opt(mut self, trigger: Option<Arc<CacheTrigger>>) -> Self {
        self.cache_trigger = trigger;
        self
    }

    /// Groups offered by the post form, ordered by title.
    pub async fn group_choices(&self) -> Result<Vec<GroupRecord>, PostError> {
        Ok(self.groups.list_groups().await?)
    }

    #[instrument(skip(self, author, draft), fields(author = %author.username))]
    pub async fn create_post(
        &self,
        author: &UserRecord,
        draft: PostDraft,
    ) -> Result<PostRecord, PostError> {
        let valid = self.validate_draft(draft).await?;
        let image = self.store_image(valid.image).await?;

        let post = self
            .writer
            .create_post(CreatePostParams {
                author_id: author.id,
                text: valid.text,
                group_id: valid.group_id,
                image,
            })
            .await?;

        if let Some(trigger) = &self.cache_trigger {
            trigger.post_created(post.id);
        }

        info!(
            post_id = post.id,
            author = %author.username,
            group = ?post.group.as_ref().map(|group| group.slug.as_str()),
            "Created post"
        );
        Ok(post)
    }

    /// Load a post for its edit form; only the author may open it.
    pub async fn editable_post(
        &self,
        editor: &UserRecord,
        username: &str,
        post_id: i64,
    ) -> Result<PostRecord, PostError> {
        let post = self.find_authored_post(username, post_id).await?;
        if post.author.id != editor.id {
            return Err(PostError::Forbidden {
                post_id,
                user_id: editor.id,
            });
        }
        Ok(post)
    }

    /// Replace text, group and optionally the image. Author and publication
    /// date stay untouched; without a new file the current image is kept.
    #[instrument(skip(self, editor, draft), fields(editor = %editor.username))]
    pub async fn update_post(
        &self,
        editor: &UserRecord,
        username: &str,
        post_id: i64,
        draft: PostDraft,
    ) -> Result<PostRecord, PostError> {
        let current = self.editable_post(editor, username, post_id).await?;
        let valid = self.validate_draft(draft).await?;
        let image = match self.store_image(valid.image).await? {
            Some(stored) => Some(stored),
            None => current.image,
        };

        let post = self
            .writer
            .update_post(UpdatePostParams {
                id: current.id,
                text: valid.text,
                group_id: valid.group_id,
                image,
            })
            .await?;

        if let Some(trigger) = &self.cache_trigger {
            trigger.post_updated(post.id);
        }

        info!(
            post_id = post.id,
            author = %editor.username,
            group = ?post.group.as_ref().map(|group| group.slug.as_str()),
            "Updated post"
        );
        Ok(post)
    }

    #[instrument(skip(self, author, text), fields(author = %author.username))]
    pub async fn add_comment(
        &self,
        author: &UserRecord,
        username: &str,
        post_id: i64,
        text: &str,
    ) -> Result<CommentRecord, PostError> {
        let post = self.find_authored_post(username, post_id).await?;

        let text = text.trim();
        if text.is_empty() {
            let mut errors = FormErrors::default();
            errors.push("text", COMMENT_TEXT_REQUIRED);
            return Err(PostError::Validation(errors));
        }

        let comment = self
            .comments
            .create_comment(CreateCommentParams {
                post_id: post.id,
                author_id: author.id,
                text: text.to_string(),
            })
            .await?;

        if let Some(trigger) = &self.cache_trigger {
            trigger.comment_created(post.id);
        }

        info!(
            post_id = post.id,
            comment_id = comment.id,
            author = %author.username,
            "Added comment"
        );
        Ok(comment)
    }

    async fn find_authored_post(&self, username: &str, post_id: i64) -> Result<PostRecord, PostError> {
        let author = self
            .users
            .find_by_username(username)
            .await?
            .ok_or(PostError::NotFound { entity: "user" })?;
        self.reader
            .find_post(post_id)
            .await?
            .filter(|post| post.author.id == author.id)
            .ok_or(PostError::NotFound { entity: "post" })
    }

    async fn validate_draft(&self, draft: PostDraft) -> Result<ValidDraft, PostError> {
        let mut errors = FormErrors::default();

        let text = draft.text.trim().to_string();
        if text.is_empty() {
            errors.push("text", POST_TEXT_REQUIRED);
        }

        let group_id = match draft.group.trim() {
            "" => None,
            raw => match raw.parse::<i64>() {
                Ok(id) => match self.groups.find_by_id(id).await? {
                    Some(group) => Some(group.id),
                    None => {
                        errors.push("group", GROUP_INVALID_CHOICE);
                        None
                    }
                },
                Err(_) => {
                    errors.push("group", GROUP_INVALID_CHOICE);
                    None
                }
            },
        };

        let image = draft.image.filter(|upload| !upload.file_name.is_empty());
        if let Some(upload) = &image
            && (!upload.is_image() || upload.data.is_empty())
        {
            errors.push("image", IMAGE_INVALID);
        }

        if !errors.is_empty() {
            return Err(PostError::Validation(errors));
        }

        Ok(ValidDraft {
            text,
            group_id,
            image,
        })
    }

    async fn store_image(&self, upload: Option<ImageUpload>) -> Result<Option<String>, PostError> {
        match upload {
            Some(upload) => Ok(Some(
                self.images
                    .store_image(&upload.file_name, upload.data)
                    .await?,
            )),
            None => Ok(None),
        }
    }
}

struct ValidDraft {
    text: String,
    group_id: Option<i64>,
    image: Option<ImageUpload>,
}
