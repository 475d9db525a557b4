//! JSON request and response bodies for the proxy API

use bucketdesk_core::ClientConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{BucketSummary, ListObjectsResult, ObjectSummary};

/// Body carrying only credentials (`/connect`, `/buckets`)
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRequest {
    #[serde(default)]
    pub config: ClientConfig,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListObjectsRequest {
    #[serde(default)]
    pub config: ClientConfig,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub continuation_token: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateBucketRequest {
    #[serde(default)]
    pub config: ClientConfig,
    #[serde(default)]
    pub bucket_name: String,
    /// Placement region; falls back to the config region
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderRequest {
    #[serde(default)]
    pub config: ClientConfig,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    #[serde(default)]
    pub config: ClientConfig,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub items: Vec<DeleteItem>,
}

/// One entry of a delete request: an object key or, with `isBucket`, a bucket name
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeleteItem {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default, alias = "name")]
    pub bucket_name: Option<String>,
    #[serde(default)]
    pub is_bucket: bool,
}

impl DeleteItem {
    pub fn object(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn bucket(name: impl Into<String>) -> Self {
        Self {
            bucket_name: Some(name.into()),
            is_bucket: true,
            ..Self::default()
        }
    }

    /// Key for object items, bucket name for bucket items
    pub fn target(&self) -> Option<&str> {
        let target = if self.is_bucket {
            self.bucket_name.as_deref().or(self.key.as_deref())
        } else {
            self.key.as_deref()
        };
        target.filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

impl SuccessResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BucketRef {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,
}

impl From<BucketSummary> for BucketRef {
    fn from(bucket: BucketSummary) -> Self {
        Self {
            name: bucket.name,
            creation_date: bucket.creation_date,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    pub key: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
}

impl From<ObjectSummary> for ObjectRef {
    fn from(object: ObjectSummary) -> Self {
        Self {
            key: object.key,
            size: object.size,
            last_modified: object.last_modified,
            e_tag: object.etag,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BucketsResponse {
    pub buckets: Vec<BucketRef>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectsResponse {
    pub contents: Vec<ObjectRef>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_continuation_token: Option<String>,
}

impl From<ListObjectsResult> for ObjectsResponse {
    fn from(result: ListObjectsResult) -> Self {
        Self {
            contents: result.objects.into_iter().map(ObjectRef::from).collect(),
            common_prefixes: result.common_prefixes,
            is_truncated: result.is_truncated,
            next_continuation_token: result.next_continuation_token,
        }
    }
}

/// Connection defaults offered to the frontend for pre-filling its form.
///
/// The secret key is never exposed.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDefaults {
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
}
