use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{CommentsRepo, CreateCommentParams, RepoError};
use crate::domain::entities::{AuthorRef, CommentRecord};
use crate::domain::users::display_name;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: i64,
    post_id: i64,
    text: String,
    created: OffsetDateTime,
    author_id: i64,
    author_username: String,
    author_first_name: String,
    author_last_name: String,
}

impl From<CommentRow> for CommentRecord {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            post_id: row.post_id,
            text: row.text,
            created: row.created,
            author: AuthorRef {
                id: row.author_id,
                display_name: display_name(
                    &row.author_first_name,
                    &row.author_last_name,
                    &row.author_username,
                ),
                username: row.author_username,
            },
        }
    }
}

#[async_trait]
impl CommentsRepo for PostgresRepositories {
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentRecord>, RepoError> {
        let rows = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT
                c.id,
                c.post_id,
                c.text,
                c.created,
                u.id AS author_id,
                u.username AS author_username,
                u.first_name AS author_first_name,
                u.last_name AS author_last_name
            FROM comments c
            INNER JOIN users u ON u.id = c.author_id
            WHERE c.post_id = $1
            ORDER BY c.created ASC, c.id ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CommentRecord::from).collect())
    }

    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let row = sqlx::query_as::<_, CommentRow>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (text, author_id, post_id)
                VALUES ($1, $2, $3)
                RETURNING id, post_id, text, created, author_id
            )
            SELECT
                i.id,
                i.post_id,
                i.text,
                i.created,
                u.id AS author_id,
                u.username AS author_username,
                u.first_name AS author_first_name,
                u.last_name AS author_last_name
            FROM inserted i
            INNER JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(&params.text)
        .bind(params.author_id)
        .bind(params.post_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }
}
