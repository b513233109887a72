//! Repository traits describing persistence adapters.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::{
    AuditLogRecord, PostRecord, RefreshTokenRecord, UploadRecord, UserRecord,
};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub name: String,
    pub email: String,
    pub password_digest: String,
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    /// Fails with [`RepoError::Duplicate`] when the email is already registered.
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError>;
}

#[derive(Debug, Clone)]
pub struct CreatePostParams {
    pub title: String,
    pub body: String,
    pub author_id: i64,
}

/// Partial update; `None` leaves a column untouched. `updated_at` is always bumped.
#[derive(Debug, Clone, Default)]
pub struct UpdatePostParams {
    pub title: Option<String>,
    pub body: Option<String>,
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError>;

    async fn find_post(&self, id: i64) -> Result<Option<PostRecord>, RepoError>;

    async fn list_posts(&self) -> Result<Vec<PostRecord>, RepoError>;

    /// Returns the row as stored after the update, or `None` if no post has `id`.
    async fn update_post(
        &self,
        id: i64,
        params: UpdatePostParams,
    ) -> Result<Option<PostRecord>, RepoError>;

    /// Returns `true` when a row was removed.
    async fn delete_post(&self, id: i64) -> Result<bool, RepoError>;
}

#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: OffsetDateTime,
}

/// Durable refresh-token storage keyed by the token's SHA-256 digest.
#[async_trait]
pub trait TokensRepo: Send + Sync {
    async fn save_token(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, RepoError>;

    /// Atomically removes and returns the row for `token_hash`.
    ///
    /// Of any number of concurrent callers presenting the same digest, at most
    /// one observes `Some`. Expired rows are removed too.
    async fn redeem_token(&self, token_hash: &str)
    -> Result<Option<RefreshTokenRecord>, RepoError>;

    /// Read-only lookup that leaves the row in place.
    async fn peek_token(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, RepoError>;

    /// Removes rows whose expiry is before `now`, returning how many were deleted.
    async fn purge_expired(&self, now: OffsetDateTime) -> Result<u64, RepoError>;
}

#[derive(Debug, Clone)]
pub struct CreateUploadParams {
    pub file_name: String,
    pub author_id: i64,
    pub comment: String,
}

#[async_trait]
pub trait UploadsRepo: Send + Sync {
    /// Fails with [`RepoError::Duplicate`] when the author already owns `file_name`.
    async fn create_upload(&self, params: CreateUploadParams) -> Result<UploadRecord, RepoError>;

    async fn find_upload_by_name(
        &self,
        author_id: i64,
        file_name: &str,
    ) -> Result<Option<UploadRecord>, RepoError>;

    async fn delete_upload(&self, id: i64) -> Result<(), RepoError>;
}

#[async_trait]
pub trait AuditRepo: Send + Sync {
    async fn append_log(&self, record: AuditLogRecord) -> Result<(), RepoError>;

    async fn list_recent(&self, limit: u32) -> Result<Vec<AuditLogRecord>, RepoError>;
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid file name")]
    InvalidName,
    #[error("a file with this name already exists")]
    AlreadyExists,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result of writing an upload.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub path: PathBuf,
    pub checksum: String,
    pub size_bytes: u64,
}

/// Byte storage for uploaded files, addressed by author and file name.
#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn exists(&self, author_id: i64, file_name: &str) -> Result<bool, StorageError>;

    /// Never overwrites: an existing file yields [`StorageError::AlreadyExists`].
    async fn write(
        &self,
        author_id: i64,
        file_name: &str,
        data: &Bytes,
    ) -> Result<StoredFile, StorageError>;
}
