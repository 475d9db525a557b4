//! Storage backends

mod ephemeral;
mod sdk;
mod traits;


pub use ephemeral::{BackendCall, EphemeralBackend};
pub use sdk::{SdkBackend, DEFAULT_PART_SIZE};
pub use traits::{
    BackendError, BucketSummary, ListObjectsResult, ObjectSummary, StorageBackend, UploadBody,
};
