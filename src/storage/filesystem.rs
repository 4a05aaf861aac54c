//! ローカルディスク上に `{root}/{bucket}/{key}` としてオブジェクトを保存するストア。
use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use super::{ObjectStore, StorageError, validate_location};

#[derive(Debug, Clone)]
pub struct FilesystemObjectStore {
    root: PathBuf,
}

impl FilesystemObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        validate_location(bucket, key)?;
        let mut path = self.root.join(bucket);
        path.extend(key.split('/'));
        Ok(path)
    }

    fn io_error(bucket: &str, key: &str, source: std::io::Error) -> StorageError {
        StorageError::Io {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source,
        }
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(bucket, key)?;
        debug!(path = %path.display(), "reading object");

        fs::read(&path).await.map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                StorageError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }
            } else {
                Self::io_error(bucket, key, source)
            }
        })
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key)?;
        debug!(path = %path.display(), bytes = body.len(), "writing object");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::io_error(bucket, key, e))?;
        }

        // 書き込み途中のファイルを読ませないため、一時ファイルからrenameする
        let mut partial = path.clone().into_os_string();
        partial.push(".partial");
        let partial = PathBuf::from(partial);

        fs::write(&partial, &body)
            .await
            .map_err(|e| Self::io_error(bucket, key, e))?;
        fs::rename(&partial, &path)
            .await
            .map_err(|e| Self::io_error(bucket, key, e))
    }
}
