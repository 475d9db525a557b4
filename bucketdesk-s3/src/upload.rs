//! Multipart upload parsing, spooling and fan-out

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use bucketdesk_core::{ApiError, ClientConfig, ErrorCode};
use bytes::{Bytes, BytesMut};
use futures::stream::{self, StreamExt};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::storage::{StorageBackend, UploadBody};

/// Largest accepted file, per file
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Files larger than this are spooled to disk while the request is read
pub const DEFAULT_SPOOL_THRESHOLD: usize = 8 * 1024 * 1024;

/// Concurrent uploads per request
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 4;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Limits applied to one upload request
#[derive(Debug, Clone)]
pub struct UploadLimits {
    pub max_file_size: u64,
    pub spool_threshold: usize,
    pub concurrency: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            spool_threshold: DEFAULT_SPOOL_THRESHOLD,
            concurrency: DEFAULT_UPLOAD_CONCURRENCY,
        }
    }
}

/// File contents, held in memory or in a temporary file removed on drop
#[derive(Debug)]
pub enum Payload {
    Memory(Bytes),
    Spooled { file: NamedTempFile, len: u64 },
}

impl Payload {
    pub fn len(&self) -> u64 {
        match self {
            Self::Memory(data) => data.len() as u64,
            Self::Spooled { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_spooled(&self) -> bool {
        matches!(self, Self::Spooled { .. })
    }

    /// Backend view of the payload; spooled files are read from disk by the backend
    pub fn body(&self) -> UploadBody {
        match self {
            Self::Memory(data) => UploadBody::Bytes(data.clone()),
            Self::Spooled { file, len } => UploadBody::File {
                path: file.path().to_path_buf(),
                len: *len,
            },
        }
    }
}

/// One file part of an upload request
#[derive(Debug)]
pub struct UploadItem {
    pub original_name: String,
    pub content_type: String,
    pub payload: Payload,
}

impl UploadItem {
    pub fn new(
        original_name: impl Into<String>,
        content_type: Option<&str>,
        payload: Payload,
    ) -> Self {
        let original_name = original_name.into();
        let content_type = content_type
            .filter(|ct| !ct.is_empty())
            .map(String::from)
            .or_else(|| {
                mime_guess::from_path(&original_name)
                    .first()
                    .map(|mime| mime.essence_str().to_string())
            })
            .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());

        Self {
            original_name,
            content_type,
            payload,
        }
    }

    /// Destination key: the target path followed by the browser-supplied file name
    pub fn destination_key(&self, path: &str) -> String {
        format!("{}{}", path, self.original_name)
    }
}

/// Parsed upload request
#[derive(Debug, Default)]
pub struct UploadForm {
    pub config: ClientConfig,
    pub bucket: String,
    pub path: String,
    pub files: Vec<UploadItem>,
}

/// Accumulates one file part, moving it to disk once it outgrows memory
pub struct Spooler {
    name: String,
    limits: UploadLimits,
    buffer: BytesMut,
    spooled: Option<(tokio::fs::File, NamedTempFile)>,
    len: u64,
}

impl Spooler {
    pub fn new(name: impl Into<String>, limits: &UploadLimits) -> Self {
        Self {
            name: name.into(),
            limits: limits.clone(),
            buffer: BytesMut::new(),
            spooled: None,
            len: 0,
        }
    }

    pub async fn push(&mut self, chunk: &[u8]) -> Result<(), ApiError> {
        self.len += chunk.len() as u64;
        if self.len > self.limits.max_file_size {
            return Err(file_too_large(&self.name, self.limits.max_file_size));
        }

        if let Some((file, _)) = self.spooled.as_mut() {
            file.write_all(chunk).await?;
            return Ok(());
        }

        self.buffer.extend_from_slice(chunk);
        if self.buffer.len() > self.limits.spool_threshold {
            let (temp, std_file) = tokio::task::spawn_blocking(create_spool_file)
                .await
                .map_err(|e| ApiError::internal(format!("Spool task failed: {e}")))??;
            let mut file = tokio::fs::File::from_std(std_file);
            file.write_all(&self.buffer).await?;
            self.buffer.clear();
            debug!(file = %self.name, path = %temp.path().display(), "Spooled upload to disk");
            self.spooled = Some((file, temp));
        }
        Ok(())
    }

    pub async fn finish(self) -> Result<Payload, ApiError> {
        match self.spooled {
            Some((mut file, temp)) => {
                file.flush().await?;
                Ok(Payload::Spooled {
                    file: temp,
                    len: self.len,
                })
            }
            None => Ok(Payload::Memory(self.buffer.freeze())),
        }
    }
}

fn create_spool_file() -> std::io::Result<(NamedTempFile, std::fs::File)> {
    let temp = NamedTempFile::new()?;
    let file = temp.reopen()?;
    Ok((temp, file))
}

/// Read the multipart body: `config` (JSON), `bucket`, `path` and file parts
pub async fn read_upload_form(
    multipart: &mut Multipart,
    limits: &UploadLimits,
) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if let Some(file_name) = field.file_name().map(String::from) {
            let content_type = field.content_type().map(String::from);
            let payload = read_file_field(&mut field, &file_name, limits).await?;
            form.files
                .push(UploadItem::new(file_name, content_type.as_deref(), payload));
            continue;
        }

        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "config" => {
                let text = field.text().await.map_err(multipart_error)?;
                form.config = serde_json::from_str(&text).map_err(|e| {
                    ApiError::invalid_request(format!("Invalid config field: {e}"))
                        .with_resource("config")
                })?;
            }
            "bucket" => form.bucket = field.text().await.map_err(multipart_error)?,
            "path" => form.path = field.text().await.map_err(multipart_error)?,
            other => debug!(field = %other, "Ignoring unknown upload field"),
        }
    }

    Ok(form)
}

async fn read_file_field(
    field: &mut Field<'_>,
    file_name: &str,
    limits: &UploadLimits,
) -> Result<Payload, ApiError> {
    let mut spooler = Spooler::new(file_name, limits);
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        spooler.push(&chunk).await?;
    }
    spooler.finish().await
}

/// Outcome of a whole upload request
#[derive(Debug, Default)]
pub struct UploadSummary {
    pub uploaded: Vec<String>,
    pub skipped: Vec<String>,
}

enum FileOutcome {
    Uploaded(String),
    Skipped(String),
}

/// Upload every file concurrently, at most `concurrency` at a time.
///
/// Waits for all uploads to settle; the first failure in request order is
/// returned. Uploads that already completed are not rolled back.
pub async fn upload_all(
    backend: &dyn StorageBackend,
    bucket: &str,
    path: &str,
    files: Vec<UploadItem>,
    concurrency: usize,
) -> Result<UploadSummary, ApiError> {
    let mut results: Vec<(usize, Result<FileOutcome, ApiError>)> =
        stream::iter(files.into_iter().enumerate())
            .map(|(index, item)| async move {
                (index, upload_one(backend, bucket, path, item).await)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;
    results.sort_by_key(|(index, _)| *index);

    let mut summary = UploadSummary::default();
    for (_, result) in results {
        match result? {
            FileOutcome::Uploaded(key) => summary.uploaded.push(key),
            FileOutcome::Skipped(name) => summary.skipped.push(name),
        }
    }
    Ok(summary)
}

async fn upload_one(
    backend: &dyn StorageBackend,
    bucket: &str,
    path: &str,
    item: UploadItem,
) -> Result<FileOutcome, ApiError> {
    if item.payload.is_empty() {
        info!(file = %item.original_name, "Skipping empty file");
        return Ok(FileOutcome::Skipped(item.original_name));
    }

    if item.original_name.contains("..") || item.original_name.contains('/') {
        warn!(file = %item.original_name, "File name contains path segments; using it verbatim");
    }

    let key = item.destination_key(path);
    let size = item.payload.len();
    backend
        .upload_object(bucket, &key, item.payload.body(), &item.content_type)
        .await
        .map_err(|e| upload_failed(&item.original_name, &e.to_string()))?;

    info!(bucket = %bucket, key = %key, size, spooled = item.payload.is_spooled(), "Uploaded file");
    Ok(FileOutcome::Uploaded(key))
}

fn upload_failed(file: &str, message: &str) -> ApiError {
    ApiError::new(
        ErrorCode::UploadFailed,
        format!("Failed to upload {file}: {message}"),
    )
    .with_resource(file)
}

fn file_too_large(file: &str, limit: u64) -> ApiError {
    ApiError::new(
        ErrorCode::EntityTooLarge,
        format!("File {file} exceeds the maximum upload size of {limit} bytes"),
    )
    .with_resource(file)
}

fn multipart_error(err: MultipartError) -> ApiError {
    ApiError::invalid_request(format!("Invalid multipart body: {}", err.body_text()))
}
