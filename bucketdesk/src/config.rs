//! Configuration management

use bucketdesk_s3::model::ConfigDefaults;
use bucketdesk_s3::storage::DEFAULT_PART_SIZE;
use bucketdesk_s3::upload::{
    DEFAULT_MAX_FILE_SIZE, DEFAULT_SPOOL_THRESHOLD, DEFAULT_UPLOAD_CONCURRENCY,
};
use bucketdesk_s3::UploadLimits;
use serde::Deserialize;
use std::path::PathBuf;

/// Storage backend the proxy talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Real S3 or an S3-compatible service, per request credentials
    S3,
    /// In-memory store for frontend development
    Ephemeral,
}

impl BackendMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::Ephemeral => "ephemeral",
        }
    }
}

/// Main configuration structure
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    #[serde(default = "default_backend")]
    pub backend: BackendMode,

    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,

    #[serde(default = "default_spool_threshold")]
    pub spool_threshold: usize,

    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,

    #[serde(default = "default_client_cache_size")]
    pub client_cache_size: usize,

    /// Multipart part size for large uploads, floored at the S3 minimum of 5 MiB
    #[serde(default = "default_part_size")]
    pub part_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            static_dir: default_static_dir(),
            backend: default_backend(),
            max_upload_size: default_max_upload_size(),
            spool_threshold: default_spool_threshold(),
            upload_concurrency: default_upload_concurrency(),
            client_cache_size: default_client_cache_size(),
            part_size: default_part_size(),
        }
    }
}

fn default_port() -> u16 {
    8000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_backend() -> BackendMode {
    BackendMode::S3
}

fn default_max_upload_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_spool_threshold() -> usize {
    DEFAULT_SPOOL_THRESHOLD
}

fn default_upload_concurrency() -> usize {
    DEFAULT_UPLOAD_CONCURRENCY
}

fn default_client_cache_size() -> usize {
    32
}

fn default_part_size() -> usize {
    DEFAULT_PART_SIZE
}

impl Config {
    /// Load configuration from an optional file and `BUCKETDESK_*` environment variables
    pub fn load(file: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(file).required(false))
            .add_source(config::Environment::with_prefix("BUCKETDESK").try_parsing(true))
            .build()?;

        Ok(config.try_deserialize::<Config>()?)
    }

    pub fn upload_limits(&self) -> UploadLimits {
        UploadLimits {
            max_file_size: self.max_upload_size,
            spool_threshold: self.spool_threshold,
            concurrency: self.upload_concurrency.max(1),
        }
    }
}

/// Connection form pre-fill values from the standard AWS variables
pub fn aws_defaults<F>(lookup: F) -> ConfigDefaults
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    ConfigDefaults {
        region: var("AWS_REGION").or_else(|| var("AWS_DEFAULT_REGION")),
        endpoint: var("AWS_ENDPOINT_URL"),
        access_key_id: var("AWS_ACCESS_KEY_ID"),
    }
}
