//! In-memory ephemeral storage backend

use super::traits::*;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Default number of entries returned per listing page
const DEFAULT_PAGE_SIZE: usize = 1000;

/// In-memory stored object
struct InMemoryObject {
    data: Bytes,
    content_type: Option<String>,
    last_modified: DateTime<Utc>,
}

/// In-memory bucket
struct InMemoryBucket {
    objects: DashMap<String, InMemoryObject>,
    location: Option<String>,
    created_at: DateTime<Utc>,
}

impl InMemoryBucket {
    fn new(location: Option<&str>) -> Self {
        Self {
            objects: DashMap::new(),
            location: location.map(String::from),
            created_at: Utc::now(),
        }
    }
}

/// A command received by the ephemeral backend, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    ListBuckets,
    ListObjects {
        bucket: String,
        prefix: String,
        delimiter: Option<String>,
    },
    CreateBucket {
        bucket: String,
        location_constraint: Option<String>,
    },
    PutObject {
        bucket: String,
        key: String,
        size: usize,
    },
    UploadObject {
        bucket: String,
        key: String,
        size: usize,
        content_type: String,
    },
    DeleteObjects {
        bucket: String,
        keys: Vec<String>,
    },
    DeleteBucket {
        bucket: String,
    },
}

/// One entry of a delimiter listing
enum Entry<'a> {
    Object(&'a str),
    Prefix(String),
}

impl Entry<'_> {
    fn marker(&self) -> &str {
        match self {
            Entry::Object(key) => key,
            Entry::Prefix(prefix) => prefix,
        }
    }
}

/// Ephemeral (in-memory) storage backend.
///
/// Serves as a sandbox when no S3 endpoint is available and records every
/// command it receives so callers can inspect the exact sequence.
pub struct EphemeralBackend {
    buckets: DashMap<String, Arc<InMemoryBucket>>,
    calls: Mutex<Vec<BackendCall>>,
    page_size: usize,
}

impl Default for EphemeralBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl EphemeralBackend {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
            calls: Mutex::new(Vec::new()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Limit listing pages to `page_size` entries
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Commands received so far
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    /// Forget recorded commands
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn bucket_exists(&self, bucket: &str) -> bool {
        self.buckets.contains_key(bucket)
    }

    /// Location constraint the bucket was created with
    pub fn bucket_location(&self, bucket: &str) -> Option<String> {
        self.buckets.get(bucket).and_then(|b| b.location.clone())
    }

    /// Stored object body and content type, if present
    pub fn object(&self, bucket: &str, key: &str) -> Option<(Bytes, Option<String>)> {
        let bucket_ref = self.buckets.get(bucket)?;
        let obj = bucket_ref.objects.get(key)?;
        Some((obj.data.clone(), obj.content_type.clone()))
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().push(call);
    }

    fn bucket(&self, bucket: &str) -> Result<Arc<InMemoryBucket>, BackendError> {
        self.buckets
            .get(bucket)
            .map(|b| Arc::clone(b.value()))
            .ok_or_else(|| BackendError::BucketNotFound(bucket.to_string()))
    }

    fn store(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), BackendError> {
        let bucket_ref = self.bucket(bucket)?;
        bucket_ref.objects.insert(
            key.to_string(),
            InMemoryObject {
                data,
                content_type: content_type.map(String::from),
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for EphemeralBackend {
    async fn list_buckets(&self) -> Result<Vec<BucketSummary>, BackendError> {
        self.record(BackendCall::ListBuckets);

        let mut buckets: Vec<BucketSummary> = self
            .buckets
            .iter()
            .map(|r| BucketSummary {
                name: r.key().clone(),
                creation_date: Some(r.created_at),
            })
            .collect();
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        continuation_token: Option<&str>,
    ) -> Result<ListObjectsResult, BackendError> {
        self.record(BackendCall::ListObjects {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            delimiter: delimiter.map(String::from),
        });

        let bucket_ref = self.bucket(bucket)?;

        // Snapshot the matching keys in lexicographic order
        let matching: BTreeMap<String, ObjectSummary> = bucket_ref
            .objects
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| {
                (
                    entry.key().clone(),
                    ObjectSummary {
                        key: entry.key().clone(),
                        size: entry.data.len() as u64,
                        last_modified: Some(entry.last_modified),
                        etag: None,
                    },
                )
            })
            .collect();

        let mut entries: Vec<Entry<'_>> = Vec::new();
        for key in matching.keys() {
            let suffix = &key[prefix.len()..];

            let entry = match delimiter.and_then(|d| suffix.find(d).map(|pos| pos + d.len())) {
                Some(end) => Entry::Prefix(format!("{}{}", prefix, &suffix[..end])),
                None => Entry::Object(key),
            };

            if let Some(token) = continuation_token {
                if entry.marker() <= token {
                    continue;
                }
            }
            if let (Entry::Prefix(p), Some(Entry::Prefix(last))) = (&entry, entries.last()) {
                if p == last {
                    continue;
                }
            }
            entries.push(entry);
        }

        let is_truncated = entries.len() > self.page_size;
        entries.truncate(self.page_size);
        let next_continuation_token = if is_truncated {
            entries.last().map(|e| e.marker().to_string())
        } else {
            None
        };

        let mut result = ListObjectsResult {
            is_truncated,
            next_continuation_token,
            ..ListObjectsResult::default()
        };
        for entry in entries {
            match entry {
                Entry::Object(key) => result.objects.push(matching[key].clone()),
                Entry::Prefix(prefix) => result.common_prefixes.push(prefix),
            }
        }
        Ok(result)
    }

    async fn create_bucket(
        &self,
        bucket: &str,
        location_constraint: Option<&str>,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::CreateBucket {
            bucket: bucket.to_string(),
            location_constraint: location_constraint.map(String::from),
        });

        if self.buckets.contains_key(bucket) {
            return Err(BackendError::BucketAlreadyExists(bucket.to_string()));
        }
        self.buckets.insert(
            bucket.to_string(),
            Arc::new(InMemoryBucket::new(location_constraint)),
        );
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::PutObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: data.len(),
        });
        self.store(bucket, key, data, content_type)
    }

    async fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        body: UploadBody,
        content_type: &str,
    ) -> Result<(), BackendError> {
        let data = body.read_all().await?;
        self.record(BackendCall::UploadObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: data.len(),
            content_type: content_type.to_string(),
        });
        self.store(bucket, key, data, Some(content_type))
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), BackendError> {
        self.record(BackendCall::DeleteObjects {
            bucket: bucket.to_string(),
            keys: keys.to_vec(),
        });

        let bucket_ref = self.bucket(bucket)?;
        // Missing keys are not an error, matching S3
        for key in keys {
            bucket_ref.objects.remove(key);
        }
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), BackendError> {
        self.record(BackendCall::DeleteBucket {
            bucket: bucket.to_string(),
        });

        let bucket_ref = self.bucket(bucket)?;
        if !bucket_ref.objects.is_empty() {
            return Err(BackendError::BucketNotEmpty(bucket.to_string()));
        }

        drop(bucket_ref);
        self.buckets.remove(bucket);
        Ok(())
    }
}
