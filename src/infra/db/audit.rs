use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{AuditRepo, RepoError},
    domain::entities::AuditLogRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    action: String,
    entity: String,
    entity_id: Option<i64>,
    user_id: i64,
    created_at: OffsetDateTime,
}

impl TryFrom<AuditRow> for AuditLogRecord {
    type Error = RepoError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let action = row.action.parse().map_err(|_| RepoError::Integrity {
            message: format!("unknown audit action `{}`", row.action),
        })?;
        let entity = row.entity.parse().map_err(|_| RepoError::Integrity {
            message: format!("unknown audit entity `{}`", row.entity),
        })?;

        Ok(Self {
            id: row.id,
            action,
            entity,
            entity_id: row.entity_id,
            user_id: row.user_id,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl AuditRepo for PostgresRepositories {
    async fn append_log(&self, record: AuditLogRecord) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, action, entity, entity_id, user_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id)
        .bind(record.action.as_str())
        .bind(record.entity.as_str())
        .bind(record.entity_id)
        .bind(record.user_id)
        .bind(record.created_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<AuditLogRecord>, RepoError> {
        let limit = limit.clamp(1, 200) as i64;
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, action, entity, entity_id, user_id, created_at
            FROM audit_logs
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(AuditLogRecord::try_from).collect()
    }
}
