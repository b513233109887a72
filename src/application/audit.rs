use std::sync::Arc;

use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::application::repos::{AuditRepo, RepoError};
use crate::domain::entities::AuditLogRecord;
use crate::domain::types::{AuditAction, AuditEntity};

/// Thin wrapper around the audit repository.
///
/// Recording is best-effort: a failing sink is logged and swallowed so the
/// calling operation still succeeds.
#[derive(Clone)]
pub struct AuditService {
    repo: Option<Arc<dyn AuditRepo>>,
}

impl AuditService {
    pub fn new(repo: Arc<dyn AuditRepo>) -> Self {
        Self { repo: Some(repo) }
    }

    /// An audit service that drops every event.
    pub fn disabled() -> Self {
        Self { repo: None }
    }

    pub async fn record(
        &self,
        user_id: i64,
        action: AuditAction,
        entity: AuditEntity,
        entity_id: Option<i64>,
    ) {
        let Some(repo) = self.repo.as_ref() else {
            return;
        };

        let record = AuditLogRecord {
            id: Uuid::new_v4(),
            action,
            entity,
            entity_id,
            user_id,
            created_at: OffsetDateTime::now_utc(),
        };

        if let Err(err) = repo.append_log(record).await {
            warn!(
                target = "quaderno::audit",
                action = action.as_str(),
                entity = entity.as_str(),
                user_id,
                entity_id = ?entity_id,
                error = %err,
                "failed to record audit event"
            );
        }
    }

    pub async fn list_recent(&self, limit: u32) -> Result<Vec<AuditLogRecord>, RepoError> {
        match self.repo.as_ref() {
            Some(repo) => repo.list_recent(limit).await,
            None => Ok(Vec::new()),
        }
    }
}
