use std::sync::Arc;

use thiserror::Error;

use crate::application::audit::AuditService;
use crate::application::repos::{CreatePostParams, PostsRepo, RepoError, UpdatePostParams};
use crate::domain::entities::PostRecord;
use crate::domain::error::{DomainError, ErrorKind};
use crate::domain::posts::{validate_body, validate_title};
use crate::domain::types::{AuditAction, AuditEntity};

#[derive(Debug, Error)]
pub enum PostError {
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error("post not found")]
    NotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl PostError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PostError::Validation(err) => err.kind(),
            PostError::NotFound | PostError::Repo(RepoError::NotFound) => ErrorKind::NotFound,
            PostError::Repo(RepoError::InvalidInput { .. }) => ErrorKind::InvalidInput,
            PostError::Repo(RepoError::Duplicate { .. }) => ErrorKind::Conflict,
            PostError::Repo(_) => ErrorKind::Internal,
        }
    }
}

/// Post CRUD for authenticated users.
///
/// The repository may be the plain store or a [`crate::cache::CachedPostsRepo`].
#[derive(Clone)]
pub struct PostService {
    repo: Arc<dyn PostsRepo>,
    audit: AuditService,
}

impl PostService {
    pub fn new(repo: Arc<dyn PostsRepo>, audit: AuditService) -> Self {
        Self { repo, audit }
    }

    pub async fn create(
        &self,
        author_id: i64,
        title: &str,
        body: &str,
    ) -> Result<PostRecord, PostError> {
        let params = CreatePostParams {
            title: validate_title(title)?,
            body: validate_body(body)?,
            author_id,
        };

        let post = self.repo.create_post(params).await?;
        self.audit
            .record(author_id, AuditAction::Create, AuditEntity::Post, Some(post.id))
            .await;
        Ok(post)
    }

    pub async fn get(&self, user_id: i64, id: i64) -> Result<PostRecord, PostError> {
        let post = self.repo.find_post(id).await?.ok_or(PostError::NotFound)?;
        self.audit
            .record(user_id, AuditAction::Get, AuditEntity::Post, Some(id))
            .await;
        Ok(post)
    }

    pub async fn list(&self) -> Result<Vec<PostRecord>, PostError> {
        Ok(self.repo.list_posts().await?)
    }

    /// Apply a partial update. At least one field must be supplied.
    pub async fn update(
        &self,
        user_id: i64,
        id: i64,
        title: Option<&str>,
        body: Option<&str>,
    ) -> Result<PostRecord, PostError> {
        if title.is_none() && body.is_none() {
            return Err(DomainError::validation("nothing to update").into());
        }

        let params = UpdatePostParams {
            title: title.map(validate_title).transpose()?,
            body: body.map(validate_body).transpose()?,
        };

        let post = self
            .repo
            .update_post(id, params)
            .await?
            .ok_or(PostError::NotFound)?;
        self.audit
            .record(user_id, AuditAction::Update, AuditEntity::Post, Some(id))
            .await;
        Ok(post)
    }

    pub async fn delete(&self, user_id: i64, id: i64) -> Result<(), PostError> {
        if !self.repo.delete_post(id).await? {
            return Err(PostError::NotFound);
        }
        self.audit
            .record(user_id, AuditAction::Delete, AuditEntity::Post, Some(id))
            .await;
        Ok(())
    }
}
