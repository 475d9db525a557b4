//! S3 proxy implementation for BucketDesk
//!
//! This crate turns the JSON and multipart requests of the browser
//! frontend into S3 calls made with the credentials each request carries.

pub mod factory;
pub mod handlers;
pub mod model;
pub mod service;
pub mod storage;
pub mod upload;

pub use factory::{BackendFactory, EphemeralBackendFactory, SdkBackendFactory};
pub use handlers::{api_router, ProxyState};
pub use service::ProxyService;
pub use upload::UploadLimits;
