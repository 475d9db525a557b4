//! Proxy operations: one storage command (or a short fixed sequence) per API call

use std::sync::Arc;

use bucketdesk_core::{ApiError, ClientConfig, ErrorCode};
use bytes::Bytes;
use tracing::{info, warn};

use crate::factory::BackendFactory;
use crate::model::{
    BucketRef, BucketsResponse, ConfigRequest, CreateBucketRequest, CreateFolderRequest,
    DeleteRequest, ListObjectsRequest, ObjectsResponse, SuccessResponse,
};
use crate::storage::{BackendError, StorageBackend};
use crate::upload::{upload_all, UploadForm, UploadLimits};

/// Region in which S3 rejects an explicit location constraint
pub const DEFAULT_REGION: &str = "us-east-1";

/// Delimiter used to group keys into folders
pub const FOLDER_DELIMITER: &str = "/";

/// Location constraint to send when creating a bucket in `region`
pub fn location_constraint_for(region: &str) -> Option<&str> {
    if region == DEFAULT_REGION {
        None
    } else {
        Some(region)
    }
}

/// Delete request split into its two kinds of targets
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DeletePlan {
    pub bucket: Option<String>,
    pub object_keys: Vec<String>,
    pub buckets: Vec<String>,
}

impl DeletePlan {
    /// Partition and validate the items, before any backend call
    pub fn from_request(request: &DeleteRequest) -> Result<Self, ApiError> {
        let mut plan = DeletePlan {
            bucket: request.bucket.clone().filter(|b| !b.trim().is_empty()),
            ..DeletePlan::default()
        };

        for (index, item) in request.items.iter().enumerate() {
            let target = item.target().ok_or_else(|| {
                ApiError::invalid_request(format!("Delete item {index} has no key or bucket name"))
            })?;
            if item.is_bucket {
                plan.buckets.push(target.to_string());
            } else {
                plan.object_keys.push(target.to_string());
            }
        }

        if !plan.object_keys.is_empty() && plan.bucket.is_none() {
            return Err(ApiError::new(
                ErrorCode::MissingBucket,
                "Bucket name is required when deleting objects",
            )
            .with_resource("bucket"));
        }
        Ok(plan)
    }

    pub fn is_empty(&self) -> bool {
        self.object_keys.is_empty() && self.buckets.is_empty()
    }

    /// Objects first in one batch, then buckets one at a time in request order
    pub async fn execute(&self, backend: &dyn StorageBackend) -> Result<(), BackendError> {
        if let (Some(bucket), false) = (&self.bucket, self.object_keys.is_empty()) {
            backend.delete_objects(bucket, &self.object_keys).await?;
        }
        for bucket in &self.buckets {
            backend.delete_bucket(bucket).await?;
        }
        Ok(())
    }
}

/// The proxy operations behind the HTTP API
pub struct ProxyService {
    factory: Arc<dyn BackendFactory>,
    limits: UploadLimits,
}

impl ProxyService {
    pub fn new(factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            factory,
            limits: UploadLimits::default(),
        }
    }

    #[must_use]
    pub fn with_upload_limits(mut self, limits: UploadLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn upload_limits(&self) -> &UploadLimits {
        &self.limits
    }

    fn backend(&self, config: &ClientConfig) -> Result<Arc<dyn StorageBackend>, ApiError> {
        self.factory.connect(config)
    }

    /// Validate credentials with a bucket listing
    pub async fn connect(&self, request: ConfigRequest) -> Result<SuccessResponse, ApiError> {
        let backend = self.backend(&request.config)?;
        backend
            .list_buckets()
            .await
            .map_err(|e| backend_error(e).with_code(ErrorCode::ConnectionFailed))?;

        info!(region = %request.config.region, endpoint = ?request.config.endpoint(), "Connection verified");
        Ok(SuccessResponse::ok("Connected successfully"))
    }

    pub async fn list_buckets(&self, request: ConfigRequest) -> Result<BucketsResponse, ApiError> {
        let backend = self.backend(&request.config)?;
        let buckets = backend.list_buckets().await.map_err(backend_error)?;

        Ok(BucketsResponse {
            buckets: buckets.into_iter().map(BucketRef::from).collect(),
        })
    }

    /// One page of a delimiter listing
    pub async fn list_objects(
        &self,
        request: ListObjectsRequest,
    ) -> Result<ObjectsResponse, ApiError> {
        require("bucket", &request.bucket)?;
        let backend = self.backend(&request.config)?;

        let result = backend
            .list_objects(
                &request.bucket,
                &request.prefix,
                Some(FOLDER_DELIMITER),
                request.continuation_token.as_deref(),
            )
            .await
            .map_err(backend_error)?;

        if result.is_truncated {
            warn!(
                bucket = %request.bucket,
                prefix = %request.prefix,
                "Listing truncated; returning first page only"
            );
        }
        Ok(ObjectsResponse::from(result))
    }

    pub async fn create_bucket(
        &self,
        request: CreateBucketRequest,
    ) -> Result<SuccessResponse, ApiError> {
        require("bucketName", &request.bucket_name)?;
        let backend = self.backend(&request.config)?;

        let region = request
            .region
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(request.config.region.trim());

        backend
            .create_bucket(&request.bucket_name, location_constraint_for(region))
            .await
            .map_err(backend_error)?;

        info!(bucket = %request.bucket_name, region = %region, "Created bucket");
        Ok(SuccessResponse::ok(format!(
            "Bucket {} created successfully",
            request.bucket_name
        )))
    }

    /// Create the zero-length marker object that displays as a folder
    pub async fn create_folder(
        &self,
        request: CreateFolderRequest,
    ) -> Result<SuccessResponse, ApiError> {
        require("bucket", &request.bucket)?;
        require("key", &request.key)?;
        let backend = self.backend(&request.config)?;

        backend
            .put_object(&request.bucket, &request.key, Bytes::new(), None)
            .await
            .map_err(backend_error)?;

        info!(bucket = %request.bucket, key = %request.key, "Created folder");
        Ok(SuccessResponse::ok(format!(
            "Folder {} created successfully",
            request.key
        )))
    }

    pub async fn upload(&self, form: UploadForm) -> Result<SuccessResponse, ApiError> {
        require("bucket", &form.bucket)?;
        if form.files.is_empty() {
            return Err(ApiError::invalid_request("No files provided").with_resource("files"));
        }
        let backend = self.backend(&form.config)?;

        let summary = upload_all(
            backend.as_ref(),
            &form.bucket,
            &form.path,
            form.files,
            self.limits.concurrency,
        )
        .await?;

        Ok(SuccessResponse::ok(format!(
            "Successfully uploaded {} file(s)",
            summary.uploaded.len()
        )))
    }

    pub async fn delete(&self, request: DeleteRequest) -> Result<SuccessResponse, ApiError> {
        let plan = DeletePlan::from_request(&request)?;
        if plan.is_empty() {
            return Err(ApiError::invalid_request("No items to delete").with_resource("items"));
        }
        let backend = self.backend(&request.config)?;

        plan.execute(backend.as_ref()).await.map_err(backend_error)?;

        info!(
            objects = plan.object_keys.len(),
            buckets = plan.buckets.len(),
            "Deleted items"
        );
        Ok(SuccessResponse::ok(format!(
            "Deleted {} item(s)",
            plan.object_keys.len() + plan.buckets.len()
        )))
    }
}

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(
            ApiError::invalid_request(format!("{field} is required")).with_resource(field)
        );
    }
    Ok(())
}

fn backend_error(err: BackendError) -> ApiError {
    ApiError::backend(err.to_string())
}
