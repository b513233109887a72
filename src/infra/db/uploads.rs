use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{CreateUploadParams, RepoError, UploadsRepo};
use crate::domain::entities::UploadRecord;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct UploadRow {
    id: i64,
    file_name: String,
    author_id: i64,
    comment: String,
    created_at: OffsetDateTime,
}

impl From<UploadRow> for UploadRecord {
    fn from(row: UploadRow) -> Self {
        Self {
            id: row.id,
            file_name: row.file_name,
            author_id: row.author_id,
            comment: row.comment,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl UploadsRepo for PostgresRepositories {
    async fn create_upload(&self, params: CreateUploadParams) -> Result<UploadRecord, RepoError> {
        let row = sqlx::query_as::<_, UploadRow>(
            r#"
            INSERT INTO uploads (file_name, author_id, comment)
            VALUES ($1, $2, $3)
            RETURNING id, file_name, author_id, comment, created_at
            "#,
        )
        .bind(params.file_name)
        .bind(params.author_id)
        .bind(params.comment)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn find_upload_by_name(
        &self,
        author_id: i64,
        file_name: &str,
    ) -> Result<Option<UploadRecord>, RepoError> {
        let row = sqlx::query_as::<_, UploadRow>(
            r#"
            SELECT id, file_name, author_id, comment, created_at
            FROM uploads
            WHERE author_id = $1 AND file_name = $2
            "#,
        )
        .bind(author_id)
        .bind(file_name)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(UploadRecord::from))
    }

    async fn delete_upload(&self, id: i64) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM uploads WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }
}
