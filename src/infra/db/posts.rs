use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{CreatePostParams, PostsRepo, RepoError, UpdatePostParams};
use crate::domain::entities::PostRecord;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct PostRow {
    id: i64,
    title: String,
    body: String,
    author_id: i64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            body: row.body,
            author_id: row.author_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            INSERT INTO posts (title, body, author_id)
            VALUES ($1, $2, $3)
            RETURNING id, title, body, author_id, created_at, updated_at
            "#,
        )
        .bind(params.title)
        .bind(params.body)
        .bind(params.author_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn find_post(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT id, title, body, author_id, created_at, updated_at
            FROM posts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(PostRecord::from))
    }

    async fn list_posts(&self) -> Result<Vec<PostRecord>, RepoError> {
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT id, title, body, author_id, created_at, updated_at
            FROM posts
            ORDER BY id
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PostRecord::from).collect())
    }

    async fn update_post(
        &self,
        id: i64,
        params: UpdatePostParams,
    ) -> Result<Option<PostRecord>, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            UPDATE posts
            SET title = COALESCE($2, title),
                body = COALESCE($3, body),
                updated_at = now()
            WHERE id = $1
            RETURNING id, title, body, author_id, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(params.title)
        .bind(params.body)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(PostRecord::from))
    }

    async fn delete_post(&self, id: i64) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}
