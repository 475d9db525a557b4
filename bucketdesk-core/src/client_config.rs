//! Per-request storage client configuration

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ApiError;

/// Credentials and endpoint supplied with every API request.
///
/// Fields default to empty so that a partially filled object deserializes and
/// fails in [`ClientConfig::validate`] with a configuration error rather than a
/// JSON error.
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    #[serde(default)]
    pub region: String,

    #[serde(default)]
    pub access_key_id: String,

    #[serde(default)]
    pub secret_access_key: String,

    #[serde(default)]
    pub endpoint: Option<String>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl ClientConfig {
    pub fn new(
        region: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            endpoint: None,
        }
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Check that region and the static credential pair are present
    pub fn validate(&self) -> Result<(), ApiError> {
        let required = [
            ("region", &self.region),
            ("accessKeyId", &self.access_key_id),
            ("secretAccessKey", &self.secret_access_key),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ApiError::missing_configuration(field));
            }
        }
        Ok(())
    }

    /// Custom endpoint, if one was given and is not blank
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }

    /// Non-AWS backends need the bucket in the path instead of the host
    pub fn uses_path_style(&self) -> bool {
        self.endpoint().is_some()
    }

    /// Stable digest of every field, used as a client cache key.
    ///
    /// Includes the secret so that two configs sharing an access key never
    /// share a client.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            self.region.as_str(),
            self.access_key_id.as_str(),
            self.secret_access_key.as_str(),
            self.endpoint().unwrap_or(""),
        ] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}
