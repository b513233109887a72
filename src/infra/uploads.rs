//! Filesystem storage for uploaded files, laid out as `<root>/<author_id>/<file_name>`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::{fs, io::AsyncWriteExt};

use crate::application::repos::{FileStorage, StorageError, StoredFile};
use crate::domain::uploads::validate_file_name;

#[derive(Debug)]
pub struct UploadStorage {
    root: PathBuf,
}

impl UploadStorage {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, author_id: i64, file_name: &str) -> Result<PathBuf, StorageError> {
        validate_file_name(file_name).map_err(|_| StorageError::InvalidName)?;
        Ok(self.root.join(author_id.to_string()).join(file_name))
    }
}

#[async_trait]
impl FileStorage for UploadStorage {
    async fn write(
        &self,
        author_id: i64,
        file_name: &str,
        data: &Bytes,
    ) -> Result<StoredFile, StorageError> {
        let path = self.resolve(author_id, file_name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StorageError::AlreadyExists);
            }
            Err(err) => return Err(err.into()),
        };

        if let Err(err) = write_all(&mut file, data).await {
            drop(file);
            let _ = fs::remove_file(&path).await;
            return Err(err.into());
        }

        let checksum = hex::encode(Sha256::digest(data));

        Ok(StoredFile {
            path,
            checksum,
            size_bytes: data.len() as u64,
        })
    }

    async fn exists(&self, author_id: i64, file_name: &str) -> Result<bool, StorageError> {
        let path = self.resolve(author_id, file_name)?;
        Ok(fs::try_exists(&path).await?)
    }
}

async fn write_all(file: &mut fs::File, data: &Bytes) -> Result<(), std::io::Error> {
    file.write_all(data).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unsafe_names_never_reach_the_filesystem() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = UploadStorage::new(dir.path().to_path_buf()).expect("storage");

        let err = storage
            .write(1, "../escape.txt", &Bytes::from_static(b"data"))
            .await
            .expect_err("traversal");

        assert!(matches!(err, StorageError::InvalidName));
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn writes_under_author_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = UploadStorage::new(dir.path().to_path_buf()).expect("storage");

        let stored = storage
            .write(7, "notes.txt", &Bytes::from_static(b"hello"))
            .await
            .expect("stored");

        assert_eq!(stored.path, dir.path().join("7").join("notes.txt"));
        assert_eq!(stored.size_bytes, 5);
        assert_eq!(stored.checksum.len(), 64);
        assert_eq!(fs::read(&stored.path).await.expect("read"), b"hello");
        assert!(storage.exists(7, "notes.txt").await.expect("exists"));
        assert!(!storage.exists(8, "notes.txt").await.expect("exists"));
    }

    #[tokio::test]
    async fn existing_file_is_not_overwritten() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = UploadStorage::new(dir.path().to_path_buf()).expect("storage");
        storage
            .write(1, "a.txt", &Bytes::from_static(b"first"))
            .await
            .expect("stored");

        let err = storage
            .write(1, "a.txt", &Bytes::from_static(b"second"))
            .await
            .expect_err("duplicate");

        assert!(matches!(err, StorageError::AlreadyExists));
        let contents = fs::read(dir.path().join("1").join("a.txt"))
            .await
            .expect("read");
        assert_eq!(contents, b"first");
    }
}
