//! In-process repositories used when no database URL is configured, and by tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::application::repos::{
    AuditRepo, CreatePostParams, CreateUploadParams, CreateUserParams, NewRefreshToken,
    PostsRepo, RepoError, TokensRepo, UpdatePostParams, UploadsRepo, UsersRepo,
};
use crate::domain::entities::{
    AuditLogRecord, PostRecord, RefreshTokenRecord, UploadRecord, UserRecord,
};

/// Mirrors the Postgres schema closely enough for the services: sequential
/// ids, the same unique constraints and the same duplicate errors.
#[derive(Debug, Default)]
pub struct MemoryRepositories {
    sequence: AtomicI64,
    users: Mutex<BTreeMap<i64, UserRecord>>,
    posts: Mutex<BTreeMap<i64, PostRecord>>,
    tokens: Mutex<HashMap<String, RefreshTokenRecord>>,
    uploads: Mutex<BTreeMap<i64, UploadRecord>>,
    audit: Mutex<Vec<AuditLogRecord>>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn health_check(&self) -> Result<(), RepoError> {
        Ok(())
    }

    fn next_id(&self) -> i64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }
}

fn duplicate(constraint: &str) -> RepoError {
    RepoError::Duplicate {
        constraint: constraint.to_string(),
    }
}

#[async_trait]
impl UsersRepo for MemoryRepositories {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut users = self.users.lock().await;
        if users.values().any(|user| user.email == params.email) {
            return Err(duplicate("users_email_key"));
        }

        let user = UserRecord {
            id: self.next_id(),
            name: params.name,
            email: params.email,
            password_digest: params.password_digest,
            registered_at: OffsetDateTime::now_utc(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        let users = self.users.lock().await;
        Ok(users.values().find(|user| user.email == email).cloned())
    }
}

#[async_trait]
impl PostsRepo for MemoryRepositories {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let post = PostRecord {
            id: self.next_id(),
            title: params.title,
            body: params.body,
            author_id: params.author_id,
            created_at: now,
            updated_at: now,
        };
        self.posts.lock().await.insert(post.id, post.clone());
        Ok(post)
    }

    async fn find_post(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        Ok(self.posts.lock().await.get(&id).cloned())
    }

    async fn list_posts(&self) -> Result<Vec<PostRecord>, RepoError> {
        Ok(self.posts.lock().await.values().cloned().collect())
    }

    async fn update_post(
        &self,
        id: i64,
        params: UpdatePostParams,
    ) -> Result<Option<PostRecord>, RepoError> {
        let mut posts = self.posts.lock().await;
        let Some(post) = posts.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(title) = params.title {
            post.title = title;
        }
        if let Some(body) = params.body {
            post.body = body;
        }
        post.updated_at = OffsetDateTime::now_utc();
        Ok(Some(post.clone()))
    }

    async fn delete_post(&self, id: i64) -> Result<bool, RepoError> {
        Ok(self.posts.lock().await.remove(&id).is_some())
    }
}

#[async_trait]
impl TokensRepo for MemoryRepositories {
    async fn save_token(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, RepoError> {
        let mut tokens = self.tokens.lock().await;
        if tokens.contains_key(&token.token_hash) {
            return Err(duplicate("refresh_tokens_token_hash_key"));
        }

        let record = RefreshTokenRecord {
            id: self.next_id(),
            user_id: token.user_id,
            token_hash: token.token_hash,
            expires_at: token.expires_at,
        };
        tokens.insert(record.token_hash.clone(), record.clone());
        Ok(record)
    }

    async fn redeem_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, RepoError> {
        Ok(self.tokens.lock().await.remove(token_hash))
    }

    async fn peek_token(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, RepoError> {
        Ok(self.tokens.lock().await.get(token_hash).cloned())
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let mut tokens = self.tokens.lock().await;
        let before = tokens.len();
        tokens.retain(|_, record| !record.is_expired_at(now));
        Ok((before - tokens.len()) as u64)
    }
}

#[async_trait]
impl UploadsRepo for MemoryRepositories {
    async fn create_upload(&self, params: CreateUploadParams) -> Result<UploadRecord, RepoError> {
        let mut uploads = self.uploads.lock().await;
        if uploads
            .values()
            .any(|upload| upload.author_id == params.author_id && upload.file_name == params.file_name)
        {
            return Err(duplicate("uploads_author_file_name_key"));
        }

        let upload = UploadRecord {
            id: self.next_id(),
            file_name: params.file_name,
            author_id: params.author_id,
            comment: params.comment,
            created_at: OffsetDateTime::now_utc(),
        };
        uploads.insert(upload.id, upload.clone());
        Ok(upload)
    }

    async fn find_upload_by_name(
        &self,
        author_id: i64,
        file_name: &str,
    ) -> Result<Option<UploadRecord>, RepoError> {
        let uploads = self.uploads.lock().await;
        Ok(uploads
            .values()
            .find(|upload| upload.author_id == author_id && upload.file_name == file_name)
            .cloned())
    }

    async fn delete_upload(&self, id: i64) -> Result<(), RepoError> {
        self.uploads.lock().await.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl AuditRepo for MemoryRepositories {
    async fn append_log(&self, record: AuditLogRecord) -> Result<(), RepoError> {
        self.audit.lock().await.push(record);
        Ok(())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<AuditLogRecord>, RepoError> {
        let audit = self.audit.lock().await;
        Ok(audit.iter().rev().take(limit as usize).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn user(email: &str) -> CreateUserParams {
        CreateUserParams {
            name: "N".to_string(),
            email: email.to_string(),
            password_digest: "digest".to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let repos = MemoryRepositories::new();
        repos.create_user(user("a@x.io")).await.expect("created");

        let err = repos.create_user(user("a@x.io")).await.expect_err("duplicate");

        assert!(matches!(err, RepoError::Duplicate { ref constraint } if constraint == "users_email_key"));
    }

    #[tokio::test]
    async fn redeem_removes_the_row() {
        let repos = MemoryRepositories::new();
        repos
            .save_token(NewRefreshToken {
                user_id: 1,
                token_hash: "h".to_string(),
                expires_at: OffsetDateTime::now_utc() + Duration::days(1),
            })
            .await
            .expect("saved");

        assert!(repos.peek_token("h").await.expect("peek").is_some());
        assert!(repos.redeem_token("h").await.expect("redeem").is_some());
        assert!(repos.redeem_token("h").await.expect("redeem").is_none());
    }

    #[tokio::test]
    async fn purge_keeps_live_tokens() {
        let repos = MemoryRepositories::new();
        let now = OffsetDateTime::now_utc();
        for (hash, offset) in [("old", -Duration::minutes(1)), ("live", Duration::hours(1))] {
            repos
                .save_token(NewRefreshToken {
                    user_id: 1,
                    token_hash: hash.to_string(),
                    expires_at: now + offset,
                })
                .await
                .expect("saved");
        }

        assert_eq!(repos.purge_expired(now).await.expect("purge"), 1);
        assert!(repos.peek_token("live").await.expect("peek").is_some());
    }
}
