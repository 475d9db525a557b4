//! Core types for BucketDesk
//!
//! This crate provides the error model, request identifiers and the
//! per-request client configuration shared by the BucketDesk crates.

pub mod client_config;
pub mod error;
pub mod request_id;

pub use client_config::ClientConfig;
pub use error::{ApiError, ErrorCode};
pub use request_id::RequestId;
