use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::audit::AuditService;
use crate::application::repos::{
    CreateUploadParams, FileStorage, RepoError, StorageError, UploadsRepo,
};
use crate::domain::entities::UploadRecord;
use crate::domain::error::ErrorKind;
use crate::domain::types::{AuditAction, AuditEntity};
use crate::domain::uploads::validate_file_name;

const MAX_COMMENT_CHARS: usize = 1024;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid file name")]
    InvalidName,
    #[error("uploaded file is empty")]
    EmptyPayload,
    #[error("uploaded file exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },
    #[error("comment is too long")]
    CommentTooLong,
    #[error("a file with this name already exists")]
    Duplicate,
    #[error(transparent)]
    Storage(StorageError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<StorageError> for UploadError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidName => UploadError::InvalidName,
            StorageError::AlreadyExists => UploadError::Duplicate,
            other => UploadError::Storage(other),
        }
    }
}

impl UploadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UploadError::InvalidName
            | UploadError::EmptyPayload
            | UploadError::TooLarge { .. }
            | UploadError::CommentTooLong => ErrorKind::InvalidInput,
            UploadError::Duplicate | UploadError::Repo(RepoError::Duplicate { .. }) => {
                ErrorKind::Conflict
            }
            UploadError::Storage(_) | UploadError::Repo(_) => ErrorKind::Internal,
        }
    }
}

/// Stores files per author and records their metadata.
#[derive(Clone)]
pub struct UploadService {
    repo: Arc<dyn UploadsRepo>,
    storage: Arc<dyn FileStorage>,
    audit: AuditService,
    max_bytes: u64,
}

impl UploadService {
    pub fn new(
        repo: Arc<dyn UploadsRepo>,
        storage: Arc<dyn FileStorage>,
        audit: AuditService,
        max_bytes: u64,
    ) -> Self {
        Self {
            repo,
            storage,
            audit,
            max_bytes,
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Persist metadata, then the file. The metadata row is removed again if
    /// the file cannot be written.
    pub async fn upload(
        &self,
        author_id: i64,
        file_name: &str,
        comment: &str,
        data: Bytes,
    ) -> Result<UploadRecord, UploadError> {
        validate_file_name(file_name).map_err(|_| UploadError::InvalidName)?;
        if data.is_empty() {
            return Err(UploadError::EmptyPayload);
        }
        if data.len() as u64 > self.max_bytes {
            return Err(UploadError::TooLarge {
                limit: self.max_bytes,
            });
        }
        if comment.chars().count() > MAX_COMMENT_CHARS {
            return Err(UploadError::CommentTooLong);
        }

        if self
            .repo
            .find_upload_by_name(author_id, file_name)
            .await?
            .is_some()
            || self.storage.exists(author_id, file_name).await?
        {
            return Err(UploadError::Duplicate);
        }

        let record = self
            .repo
            .create_upload(CreateUploadParams {
                file_name: file_name.to_string(),
                author_id,
                comment: comment.to_string(),
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => UploadError::Duplicate,
                other => UploadError::Repo(other),
            })?;

        let stored = match self.storage.write(author_id, file_name, &data).await {
            Ok(stored) => stored,
            Err(err) => {
                if let Err(cleanup) = self.repo.delete_upload(record.id).await {
                    warn!(
                        target = "quaderno::uploads",
                        upload_id = record.id,
                        error = %cleanup,
                        "failed to remove upload row after storage failure"
                    );
                }
                return Err(err.into());
            }
        };

        info!(
            target = "quaderno::uploads",
            upload_id = record.id,
            author_id,
            size_bytes = stored.size_bytes,
            checksum = %stored.checksum,
            "file stored"
        );
        self.audit
            .record(
                author_id,
                AuditAction::Create,
                AuditEntity::File,
                Some(record.id),
            )
            .await;

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::repos::StoredFile;
    use crate::infra::memory::MemoryRepositories;
    use crate::infra::uploads::UploadStorage;
    use async_trait::async_trait;

    struct ReadOnlyStorage;

    #[async_trait]
    impl FileStorage for ReadOnlyStorage {
        async fn exists(&self, _author_id: i64, _file_name: &str) -> Result<bool, StorageError> {
            Ok(false)
        }

        async fn write(
            &self,
            _author_id: i64,
            _file_name: &str,
            _data: &Bytes,
        ) -> Result<StoredFile, StorageError> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
        }
    }

    fn service(dir: &tempfile::TempDir, max_bytes: u64) -> UploadService {
        let repos = Arc::new(MemoryRepositories::new());
        let storage = Arc::new(UploadStorage::new(dir.path().to_path_buf()).expect("storage"));
        UploadService::new(repos.clone(), storage, AuditService::new(repos), max_bytes)
    }

    #[tokio::test]
    async fn stores_file_and_metadata() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = service(&dir, 1024);

        let record = service
            .upload(3, "a.txt", "first draft", Bytes::from_static(b"data"))
            .await
            .expect("uploaded");

        assert_eq!(record.author_id, 3);
        assert_eq!(record.file_name, "a.txt");
        assert_eq!(record.comment, "first draft");
        assert!(dir.path().join("3").join("a.txt").exists());
    }

    #[tokio::test]
    async fn rejects_duplicate_name_for_same_author() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = service(&dir, 1024);
        service
            .upload(3, "a.txt", "", Bytes::from_static(b"data"))
            .await
            .expect("uploaded");

        let err = service
            .upload(3, "a.txt", "", Bytes::from_static(b"other"))
            .await
            .expect_err("duplicate");
        assert_eq!(err.kind(), ErrorKind::Conflict);

        service
            .upload(4, "a.txt", "", Bytes::from_static(b"other"))
            .await
            .expect("other author may reuse the name");
    }

    #[tokio::test]
    async fn rejects_oversized_and_empty_payloads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = service(&dir, 4);

        let too_large = service
            .upload(1, "big.bin", "", Bytes::from_static(b"12345"))
            .await
            .expect_err("too large");
        assert!(matches!(too_large, UploadError::TooLarge { limit: 4 }));

        let empty = service
            .upload(1, "empty.bin", "", Bytes::new())
            .await
            .expect_err("empty");
        assert_eq!(empty.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = service(&dir, 1024);

        let err = service
            .upload(1, "../escape.txt", "", Bytes::from_static(b"data"))
            .await
            .expect_err("traversal");
        assert!(matches!(err, UploadError::InvalidName));
    }

    #[tokio::test]
    async fn failed_write_removes_metadata_row() {
        let repos = Arc::new(MemoryRepositories::new());
        let service = UploadService::new(
            repos.clone(),
            Arc::new(ReadOnlyStorage),
            AuditService::new(repos.clone()),
            1024,
        );

        let err = service
            .upload(5, "a.txt", "", Bytes::from_static(b"data"))
            .await
            .expect_err("storage is read-only");

        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(
            repos
                .find_upload_by_name(5, "a.txt")
                .await
                .expect("lookup")
                .is_none()
        );
    }
}
