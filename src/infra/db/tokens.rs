use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{NewRefreshToken, RepoError, TokensRepo};
use crate::domain::entities::RefreshTokenRecord;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct RefreshTokenRow {
    id: i64,
    user_id: i64,
    token_hash: String,
    expires_at: OffsetDateTime,
}

impl From<RefreshTokenRow> for RefreshTokenRecord {
    fn from(row: RefreshTokenRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            token_hash: row.token_hash,
            expires_at: row.expires_at,
        }
    }
}

#[async_trait]
impl TokensRepo for PostgresRepositories {
    async fn save_token(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, RepoError> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, token_hash, expires_at
            "#,
        )
        .bind(token.user_id)
        .bind(token.token_hash)
        .bind(token.expires_at)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn redeem_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, RepoError> {
        // Single statement: concurrent redeemers race on the row lock and only
        // one of them gets it back.
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            DELETE FROM refresh_tokens
            WHERE token_hash = $1
            RETURNING id, user_id, token_hash, expires_at
            "#,
        )
        .bind(token_hash)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(RefreshTokenRecord::from))
    }

    async fn peek_token(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, RepoError> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            SELECT id, user_id, token_hash, expires_at
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(RefreshTokenRecord::from))
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1")
            .bind(now)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
