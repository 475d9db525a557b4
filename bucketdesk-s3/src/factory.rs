//! Per-request storage client construction

use std::sync::Arc;

use aws_sdk_s3::config::{
    BehaviorVersion, Credentials, Region, RequestChecksumCalculation, ResponseChecksumValidation,
};
use bucketdesk_core::{ApiError, ClientConfig};
use dashmap::DashMap;
use tracing::debug;

use crate::storage::{EphemeralBackend, SdkBackend, StorageBackend, DEFAULT_PART_SIZE};

/// Provider name attached to the static credentials
const CREDENTIALS_PROVIDER: &str = "bucketdesk";

/// Turns the configuration carried by a request into a storage client
pub trait BackendFactory: Send + Sync {
    fn connect(&self, config: &ClientConfig) -> Result<Arc<dyn StorageBackend>, ApiError>;
}

/// Resolved client settings for one [`ClientConfig`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub region: String,
    pub endpoint: Option<String>,
    pub force_path_style: bool,
}

impl ClientSettings {
    pub fn resolve(config: &ClientConfig) -> Result<Self, ApiError> {
        config.validate()?;
        Ok(Self {
            region: config.region.trim().to_string(),
            endpoint: config.endpoint().map(String::from),
            force_path_style: config.uses_path_style(),
        })
    }
}

/// Build the SDK configuration for a request.
///
/// Checksums are only computed where an operation requires one; several
/// S3-compatible services reject the flexible checksum headers on uploads.
pub fn s3_config(config: &ClientConfig) -> Result<aws_sdk_s3::Config, ApiError> {
    let settings = ClientSettings::resolve(config)?;

    let credentials = Credentials::new(
        config.access_key_id.trim(),
        config.secret_access_key.trim(),
        None,
        None,
        CREDENTIALS_PROVIDER,
    );

    let mut builder = aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(settings.region))
        .credentials_provider(credentials)
        .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
        .response_checksum_validation(ResponseChecksumValidation::WhenRequired);

    if let Some(endpoint) = settings.endpoint {
        builder = builder
            .endpoint_url(endpoint)
            .force_path_style(settings.force_path_style);
    }

    Ok(builder.build())
}

/// Bounded cache of SDK backends keyed by config fingerprint
pub struct ClientCache {
    entries: DashMap<String, Arc<SdkBackend>>,
    capacity: usize,
}

impl ClientCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get the backend for `key`, building and caching it on a miss
    pub fn get_or_try_insert<F>(&self, key: &str, build: F) -> Result<Arc<SdkBackend>, ApiError>
    where
        F: FnOnce() -> Result<SdkBackend, ApiError>,
    {
        if let Some(hit) = self.entries.get(key) {
            return Ok(Arc::clone(hit.value()));
        }

        let backend = Arc::new(build()?);
        if self.entries.len() >= self.capacity {
            let victim = self.entries.iter().next().map(|e| e.key().clone());
            if let Some(victim) = victim {
                self.entries.remove(&victim);
            }
        }
        self.entries.insert(key.to_string(), Arc::clone(&backend));
        Ok(backend)
    }
}

/// Factory producing SDK-backed clients, optionally cached
pub struct SdkBackendFactory {
    cache: Option<ClientCache>,
    part_size: usize,
}

impl Default for SdkBackendFactory {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SdkBackendFactory {
    /// `cache_size` of zero builds a fresh client for every request
    pub fn new(cache_size: usize) -> Self {
        Self {
            cache: (cache_size > 0).then(|| ClientCache::new(cache_size)),
            part_size: DEFAULT_PART_SIZE,
        }
    }

    #[must_use]
    pub fn with_part_size(mut self, part_size: usize) -> Self {
        self.part_size = part_size;
        self
    }

    fn build(&self, config: &ClientConfig) -> Result<SdkBackend, ApiError> {
        let client = aws_sdk_s3::Client::from_conf(s3_config(config)?);
        debug!(region = %config.region, endpoint = ?config.endpoint(), "Built S3 client");
        Ok(SdkBackend::new(client).with_part_size(self.part_size))
    }
}

impl BackendFactory for SdkBackendFactory {
    fn connect(&self, config: &ClientConfig) -> Result<Arc<dyn StorageBackend>, ApiError> {
        config.validate()?;

        match &self.cache {
            Some(cache) => {
                let backend =
                    cache.get_or_try_insert(&config.fingerprint(), || self.build(config))?;
                Ok(backend)
            }
            None => Ok(Arc::new(self.build(config)?)),
        }
    }
}

/// Factory handing out one shared in-memory backend
pub struct EphemeralBackendFactory {
    backend: Arc<EphemeralBackend>,
}

impl Default for EphemeralBackendFactory {
    fn default() -> Self {
        Self::new(Arc::new(EphemeralBackend::new()))
    }
}

impl EphemeralBackendFactory {
    pub fn new(backend: Arc<EphemeralBackend>) -> Self {
        Self { backend }
    }
}

impl BackendFactory for EphemeralBackendFactory {
    fn connect(&self, config: &ClientConfig) -> Result<Arc<dyn StorageBackend>, ApiError> {
        // Credentials are still required so the sandbox behaves like S3 mode
        config.validate()?;
        Ok(self.backend.clone())
    }
}
