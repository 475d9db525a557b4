//! API error types and formatting

use serde::Serialize;
use thiserror::Error;

use crate::RequestId;

/// Error codes returned by the proxy API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Request validation
    MissingConfiguration,
    InvalidRequest,
    MissingBucket,
    EntityTooLarge,

    // Backend
    BackendFailure,
    ConnectionFailed,
    UploadFailed,

    // Proxy
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingConfiguration => "MissingConfiguration",
            Self::InvalidRequest => "InvalidRequest",
            Self::MissingBucket => "MissingBucket",
            Self::EntityTooLarge => "EntityTooLarge",
            Self::BackendFailure => "BackendFailure",
            Self::ConnectionFailed => "ConnectionFailed",
            Self::UploadFailed => "UploadFailed",
            Self::InternalError => "InternalError",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::MissingConfiguration
            | Self::InvalidRequest
            | Self::MissingBucket
            | Self::EntityTooLarge
            | Self::ConnectionFailed => 400,
            Self::BackendFailure | Self::UploadFailed | Self::InternalError => 500,
        }
    }
}

/// Error surfaced to API callers
#[derive(Debug, Error)]
#[error("{}: {}", .code.as_str(), .message)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub resource: Option<String>,
    pub request_id: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            resource: None,
            request_id: RequestId::new().to_string(),
        }
    }

    /// Missing or empty credential field
    pub fn missing_configuration(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingConfiguration,
            format!("Missing AWS configuration: {field} is required"),
        )
        .with_resource(field)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BackendFailure, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Re-tag the error, keeping message and resource
    #[must_use]
    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = code;
        self
    }

    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Format as the JSON error body
    pub fn to_json(&self) -> serde_json::Value {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct JsonError<'a> {
            error: &'a str,
            code: &'static str,
            #[serde(skip_serializing_if = "Option::is_none")]
            resource: Option<&'a str>,
            request_id: &'a str,
        }

        let error = JsonError {
            error: &self.message,
            code: self.code.as_str(),
            resource: self.resource.as_deref(),
            request_id: &self.request_id,
        };

        serde_json::to_value(error).unwrap_or_else(|_| {
            serde_json::json!({ "error": self.message, "code": self.code.as_str() })
        })
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        Self::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_json_format() {
        let error = ApiError::new(ErrorCode::BackendFailure, "The specified bucket does not exist")
            .with_resource("my-bucket")
            .with_request_id("test-request-id");

        let json = error.to_json();
        assert_eq!(json["error"], "The specified bucket does not exist");
        assert_eq!(json["code"], "BackendFailure");
        assert_eq!(json["resource"], "my-bucket");
        assert_eq!(json["requestId"], "test-request-id");
    }

    #[test]
    fn test_error_json_omits_missing_resource() {
        let json = ApiError::invalid_request("bad body").to_json();
        assert!(json.get("resource").is_none());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ErrorCode::MissingConfiguration.http_status(), 400);
        assert_eq!(ErrorCode::MissingBucket.http_status(), 400);
        assert_eq!(ErrorCode::ConnectionFailed.http_status(), 400);
        assert_eq!(ErrorCode::BackendFailure.http_status(), 500);
        assert_eq!(ErrorCode::UploadFailed.http_status(), 500);
    }

    #[test]
    fn test_with_code_keeps_message() {
        let error = ApiError::backend("InvalidAccessKeyId").with_code(ErrorCode::ConnectionFailed);
        assert_eq!(error.code, ErrorCode::ConnectionFailed);
        assert_eq!(error.message, "InvalidAccessKeyId");
        assert_eq!(error.http_status(), 400);
    }
}
