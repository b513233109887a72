//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::{AuditAction, AuditEntity};

/// Registered account. The digest never leaves the service layer.
#[derive(Clone, PartialEq)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password_digest: String,
    pub registered_at: OffsetDateTime,
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password_digest", &"<redacted>")
            .field("registered_at", &self.registered_at)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostRecord {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub author_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Persisted refresh token. Only the SHA-256 digest of the opaque value is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: OffsetDateTime,
}

impl RefreshTokenRecord {
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at < now
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadRecord {
    pub id: i64,
    pub file_name: String,
    pub author_id: i64,
    pub comment: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditLogRecord {
    pub id: Uuid,
    pub action: AuditAction,
    pub entity: AuditEntity,
    pub entity_id: Option<i64>,
    pub user_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
