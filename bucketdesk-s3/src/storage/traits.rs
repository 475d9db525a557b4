//! Storage backend traits

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io::SeekFrom;
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Errors from storage operations
#[derive(Debug, Error)]
pub enum BackendError {
    /// Failure reported by the S3 service or the SDK; the message is passed through verbatim
    #[error("{message}")]
    Sdk {
        operation: &'static str,
        message: String,
    },

    #[error("The specified bucket does not exist: {0}")]
    BucketNotFound(String),

    #[error("Bucket already exists: {0}")]
    BucketAlreadyExists(String),

    #[error("The bucket you tried to delete is not empty: {0}")]
    BucketNotEmpty(String),

    #[error("Failed to delete {key}: {message}")]
    DeleteFailed { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A bucket as reported by the backend
#[derive(Debug, Clone)]
pub struct BucketSummary {
    pub name: String,
    pub creation_date: Option<DateTime<Utc>>,
}

/// Summary of an object in a listing
#[derive(Debug, Clone)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
}

/// Result of a single-page list operation
#[derive(Debug, Default)]
pub struct ListObjectsResult {
    pub objects: Vec<ObjectSummary>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

/// Contents of an upload: an in-memory buffer or a file on disk
#[derive(Debug, Clone)]
pub enum UploadBody {
    Bytes(Bytes),
    File { path: PathBuf, len: u64 },
}

impl UploadBody {
    pub fn len(&self) -> u64 {
        match self {
            Self::Bytes(data) => data.len() as u64,
            Self::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read `len` bytes starting at `offset`, clamped to the end of the body
    pub async fn read_range(&self, offset: u64, len: usize) -> std::io::Result<Bytes> {
        let end = self.len().min(offset.saturating_add(len as u64));
        let start = offset.min(end);
        match self {
            Self::Bytes(data) => Ok(data.slice(start as usize..end as usize)),
            Self::File { path, .. } => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(SeekFrom::Start(start)).await?;
                let mut buf = Vec::with_capacity((end - start) as usize);
                file.take(end - start).read_to_end(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
        }
    }

    /// Read the whole body into memory
    pub async fn read_all(&self) -> std::io::Result<Bytes> {
        match self {
            Self::Bytes(data) => Ok(data.clone()),
            Self::File { path, .. } => Ok(Bytes::from(tokio::fs::read(path).await?)),
        }
    }
}

impl From<Bytes> for UploadBody {
    fn from(data: Bytes) -> Self {
        Self::Bytes(data)
    }
}

/// Capability interface over an S3-compatible object store.
///
/// Each method maps to one backend command, except `upload_object`, which may
/// issue a multipart sequence for large payloads.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// List all buckets visible to the credentials
    async fn list_buckets(&self) -> Result<Vec<BucketSummary>, BackendError>;

    /// List one page of objects under `prefix`
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        continuation_token: Option<&str>,
    ) -> Result<ListObjectsResult, BackendError>;

    /// Create a bucket, placing it in `location_constraint` when given
    async fn create_bucket(
        &self,
        bucket: &str,
        location_constraint: Option<&str>,
    ) -> Result<(), BackendError>;

    /// Store an object with a single request
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), BackendError>;

    /// Upload a file payload, splitting it into parts when it is large
    async fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        body: UploadBody,
        content_type: &str,
    ) -> Result<(), BackendError>;

    /// Delete a batch of keys with one request
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), BackendError>;

    /// Delete an (empty) bucket
    async fn delete_bucket(&self, bucket: &str) -> Result<(), BackendError>;
}
