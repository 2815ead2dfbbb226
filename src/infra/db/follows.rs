use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{FollowsRepo, RepoError};
use crate::domain::entities::FollowRecord;
use crate::domain::follows::FollowEdge;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct FollowRow {
    id: i64,
    user_id: i64,
    author_id: i64,
    follow_on_date: OffsetDateTime,
}

impl From<FollowRow> for FollowRecord {
    fn from(row: FollowRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            author_id: row.author_id,
            follow_on_date: row.follow_on_date,
        }
    }
}

#[async_trait]
impl FollowsRepo for PostgresRepositories {
    async fn find_follow(&self, edge: FollowEdge) -> Result<Option<FollowRecord>, RepoError> {
        let row = sqlx::query_as::<_, FollowRow>(
            r#"
            SELECT id, user_id, author_id, follow_on_date
            FROM follows
            WHERE user_id = $1 AND author_id = $2
            "#,
        )
        .bind(edge.user_id())
        .bind(edge.author_id())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(FollowRecord::from))
    }

    async fn insert_follow(&self, edge: FollowEdge) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"
            INSERT INTO follows (user_id, author_id)
            VALUES ($1, $2)
            ON CONFLICT ON CONSTRAINT follows_user_author_key DO NOTHING
            "#,
        )
        .bind(edge.user_id())
        .bind(edge.author_id())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_follow(&self, edge: FollowEdge) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM follows WHERE user_id = $1 AND author_id = $2")
            .bind(edge.user_id())
            .bind(edge.author_id())
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}
