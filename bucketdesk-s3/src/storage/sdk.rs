//! Storage backend over the AWS SDK S3 client

use super::traits::*;
use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::{ByteStream, DateTime as SdkDateTime};
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
    Delete, ObjectIdentifier,
};
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// Part size for multipart uploads; payloads smaller than this use a single PUT
pub const DEFAULT_PART_SIZE: usize = 8 * 1024 * 1024;

/// S3 requires every part except the last to be at least 5 MiB
const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Backend issuing real S3 commands through an SDK client
#[derive(Debug, Clone)]
pub struct SdkBackend {
    client: Client,
    part_size: usize,
}

impl SdkBackend {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            part_size: DEFAULT_PART_SIZE,
        }
    }

    #[must_use]
    pub fn with_part_size(mut self, part_size: usize) -> Self {
        self.part_size = part_size.max(MIN_PART_SIZE);
        self
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        body: &UploadBody,
    ) -> Result<Vec<CompletedPart>, BackendError> {
        let mut parts = Vec::new();
        let mut offset = 0;
        while offset < body.len() {
            // One part in memory at a time
            let chunk = body.read_range(offset, self.part_size).await?;
            if chunk.is_empty() {
                return Err(BackendError::Internal(format!(
                    "upload body ended at {offset} of {} bytes",
                    body.len()
                )));
            }
            let chunk_len = chunk.len() as u64;
            let part_number = i32::try_from(parts.len() + 1)
                .map_err(|_| BackendError::Internal("too many upload parts".to_string()))?;

            let output = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(|e| sdk_error("UploadPart", &e))?;

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(output.e_tag().map(String::from))
                    .part_number(part_number)
                    .build(),
            );
            offset += chunk_len;
        }
        Ok(parts)
    }

    async fn multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        body: &UploadBody,
        content_type: &str,
    ) -> Result<(), BackendError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| sdk_error("CreateMultipartUpload", &e))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| BackendError::Internal("missing upload id".to_string()))?
            .to_string();

        debug!(bucket = %bucket, key = %key, upload_id = %upload_id, size = body.len(), "Started multipart upload");

        let parts = match self.upload_parts(bucket, key, &upload_id, body).await {
            Ok(parts) => parts,
            Err(err) => {
                self.abort(bucket, key, &upload_id).await;
                return Err(err);
            }
        };

        let completed = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await;

        if let Err(err) = completed {
            self.abort(bucket, key, &upload_id).await;
            return Err(sdk_error("CompleteMultipartUpload", &err));
        }
        Ok(())
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream,
        content_type: Option<&str>,
    ) -> Result<(), BackendError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .set_content_type(content_type.map(String::from))
            .send()
            .await
            .map_err(|e| sdk_error("PutObject", &e))?;
        Ok(())
    }

    async fn abort(&self, bucket: &str, key: &str, upload_id: &str) {
        let aborted = self
            .client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await;
        if let Err(err) = aborted {
            warn!(
                bucket = %bucket,
                key = %key,
                upload_id = %upload_id,
                error = %DisplayErrorContext(&err),
                "Failed to abort multipart upload"
            );
        }
    }
}

#[async_trait]
impl StorageBackend for SdkBackend {
    async fn list_buckets(&self) -> Result<Vec<BucketSummary>, BackendError> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| sdk_error("ListBuckets", &e))?;

        Ok(output
            .buckets()
            .iter()
            .map(|b| BucketSummary {
                name: b.name().unwrap_or_default().to_string(),
                creation_date: b.creation_date().and_then(to_chrono),
            })
            .collect())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        continuation_token: Option<&str>,
    ) -> Result<ListObjectsResult, BackendError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_delimiter(delimiter.map(String::from))
            .set_continuation_token(continuation_token.map(String::from))
            .send()
            .await
            .map_err(|e| sdk_error("ListObjectsV2", &e))?;

        Ok(ListObjectsResult {
            objects: output
                .contents()
                .iter()
                .map(|o| ObjectSummary {
                    key: o.key().unwrap_or_default().to_string(),
                    size: o.size().and_then(|s| u64::try_from(s).ok()).unwrap_or(0),
                    last_modified: o.last_modified().and_then(to_chrono),
                    etag: o.e_tag().map(String::from),
                })
                .collect(),
            common_prefixes: output
                .common_prefixes()
                .iter()
                .filter_map(|p| p.prefix().map(String::from))
                .collect(),
            is_truncated: output.is_truncated().unwrap_or(false),
            next_continuation_token: output.next_continuation_token().map(String::from),
        })
    }

    async fn create_bucket(
        &self,
        bucket: &str,
        location_constraint: Option<&str>,
    ) -> Result<(), BackendError> {
        let mut request = self.client.create_bucket().bucket(bucket);
        if let Some(region) = location_constraint {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }

        request
            .send()
            .await
            .map_err(|e| sdk_error("CreateBucket", &e))?;
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), BackendError> {
        self.put(bucket, key, ByteStream::from(data), content_type).await
    }

    async fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        body: UploadBody,
        content_type: &str,
    ) -> Result<(), BackendError> {
        if body.len() >= self.part_size as u64 {
            return self
                .multipart_upload(bucket, key, &body, content_type)
                .await;
        }

        let stream = match body {
            UploadBody::Bytes(data) => ByteStream::from(data),
            UploadBody::File { path, .. } => ByteStream::from_path(&path)
                .await
                .map_err(|e| BackendError::Internal(e.to_string()))?,
        };
        self.put(bucket, key, stream, Some(content_type)).await
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), BackendError> {
        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| BackendError::Internal(e.to_string()))?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| BackendError::Internal(e.to_string()))?;

        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteObjects", &e))?;

        // A 200 response can still carry per-key failures
        if let Some(failed) = output.errors().first() {
            return Err(BackendError::DeleteFailed {
                key: failed.key().unwrap_or_default().to_string(),
                message: failed
                    .message()
                    .or(failed.code())
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), BackendError> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteBucket", &e))?;
        Ok(())
    }
}

/// Flatten an SDK error into the service message, falling back to the full error chain
fn sdk_error<E, R>(operation: &'static str, err: &SdkError<E, R>) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let service = err.as_service_error();
    let message = service
        .and_then(ProvideErrorMetadata::message)
        .or_else(|| service.and_then(ProvideErrorMetadata::code))
        .map_or_else(|| DisplayErrorContext(err).to_string(), String::from);

    BackendError::Sdk { operation, message }
}

fn to_chrono(value: &SdkDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(value.secs(), value.subsec_nanos())
}
