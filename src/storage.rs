//! オブジェクトストレージ抽象。
//!
//! パイプラインが依存するのは `get` と `put` の2操作のみ。
pub mod filesystem;
pub mod memory;
pub mod s3;

use async_trait::async_trait;
use thiserror::Error;

pub use filesystem::FilesystemObjectStore;
pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_CSV: &str = "text/csv";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },
    #[error("storage backend returned status {status} for {bucket}/{key}: {body}")]
    Backend {
        bucket: String,
        key: String,
        status: u16,
        body: String,
    },
    #[error("storage request for {bucket}/{key} failed: {source}")]
    Transport {
        bucket: String,
        key: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("storage I/O for {bucket}/{key} failed: {source}")]
    Io {
        bucket: String,
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid object location {bucket}/{key}: {reason}")]
    InvalidLocation {
        bucket: String,
        key: String,
        reason: &'static str,
    },
}

impl StorageError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// オブジェクト本体を取得する。
    ///
    /// # Errors
    /// オブジェクトが存在しない場合は [`StorageError::NotFound`]、それ以外の失敗は対応する
    /// [`StorageError`] を返す。
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// オブジェクトを保存する。同一キーが存在する場合は上書きする。
    ///
    /// # Errors
    /// 保存に失敗した場合は [`StorageError`] を返す。
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;
}

/// バケット名とキーがパスとして安全に扱えるか検証する。
pub(crate) fn validate_location(bucket: &str, key: &str) -> Result<(), StorageError> {
    let invalid = |reason| StorageError::InvalidLocation {
        bucket: bucket.to_string(),
        key: key.to_string(),
        reason,
    };

    if bucket.is_empty() || bucket.contains('/') || bucket == "." || bucket == ".." {
        return Err(invalid("bucket must be a single non-empty path segment"));
    }
    if key.is_empty() || key.starts_with('/') || key.ends_with('/') {
        return Err(invalid("key must be a non-empty relative object name"));
    }
    if key.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..") {
        return Err(invalid("key must not contain empty, '.' or '..' segments"));
    }
    Ok(())
}
