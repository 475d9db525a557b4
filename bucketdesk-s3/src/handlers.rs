//! Proxy HTTP request handlers

use axum::{
    body::Body,
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::Response,
    routing::{get, post},
    Router,
};
use bucketdesk_core::{ApiError, RequestId};
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{error, warn};

use crate::model::{
    ConfigDefaults, ConfigRequest, CreateBucketRequest, CreateFolderRequest, DeleteRequest,
    ListObjectsRequest,
};
use crate::service::ProxyService;
use crate::upload::read_upload_form;

/// Shared state for proxy handlers
pub struct ProxyState {
    pub service: ProxyService,
    pub defaults: ConfigDefaults,
}

impl ProxyState {
    pub fn new(service: ProxyService) -> Self {
        Self {
            service,
            defaults: ConfigDefaults::default(),
        }
    }

    #[must_use]
    pub fn with_defaults(mut self, defaults: ConfigDefaults) -> Self {
        self.defaults = defaults;
        self
    }
}

/// Routes served under `/api`
pub fn api_router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .route("/connect", post(handle_connect))
        .route("/buckets", post(handle_list_buckets))
        .route("/objects", post(handle_list_objects))
        .route("/buckets/create", post(handle_create_bucket))
        .route("/folders/create", post(handle_create_folder))
        .route(
            "/upload",
            // The per-file limit is enforced while streaming
            post(handle_upload).layer(DefaultBodyLimit::disable()),
        )
        .route("/delete", post(handle_delete))
        .route("/defaults", get(handle_defaults))
        .with_state(state)
}

pub async fn handle_connect(State(state): State<Arc<ProxyState>>, body: Bytes) -> Response {
    let request_id = RequestId::new();
    let result = match parse_body::<ConfigRequest>(&body) {
        Ok(request) => state.service.connect(request).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(response) => json_response(StatusCode::OK, &response),
        Err(e) => {
            let e = e.with_request_id(request_id.as_str());
            log_error("connect", &e);
            let mut body = e.to_json();
            body["success"] = serde_json::Value::Bool(false);
            json_response(status_of(&e), &body)
        }
    }
}

pub async fn handle_list_buckets(State(state): State<Arc<ProxyState>>, body: Bytes) -> Response {
    let request_id = RequestId::new();
    let result = match parse_body::<ConfigRequest>(&body) {
        Ok(request) => state.service.list_buckets(request).await,
        Err(e) => Err(e),
    };
    respond("list_buckets", &request_id, result)
}

pub async fn handle_list_objects(State(state): State<Arc<ProxyState>>, body: Bytes) -> Response {
    let request_id = RequestId::new();
    let result = match parse_body::<ListObjectsRequest>(&body) {
        Ok(request) => state.service.list_objects(request).await,
        Err(e) => Err(e),
    };
    respond("list_objects", &request_id, result)
}

pub async fn handle_create_bucket(State(state): State<Arc<ProxyState>>, body: Bytes) -> Response {
    let request_id = RequestId::new();
    let result = match parse_body::<CreateBucketRequest>(&body) {
        Ok(request) => state.service.create_bucket(request).await,
        Err(e) => Err(e),
    };
    respond("create_bucket", &request_id, result)
}

pub async fn handle_create_folder(State(state): State<Arc<ProxyState>>, body: Bytes) -> Response {
    let request_id = RequestId::new();
    let result = match parse_body::<CreateFolderRequest>(&body) {
        Ok(request) => state.service.create_folder(request).await,
        Err(e) => Err(e),
    };
    respond("create_folder", &request_id, result)
}

pub async fn handle_upload(
    State(state): State<Arc<ProxyState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let request_id = RequestId::new();
    let result = match multipart {
        Ok(mut multipart) => {
            match read_upload_form(&mut multipart, state.service.upload_limits()).await {
                Ok(form) => state.service.upload(form).await,
                Err(e) => Err(e),
            }
        }
        Err(rejection) => Err(ApiError::invalid_request(format!(
            "Expected a multipart form: {}",
            rejection.body_text()
        ))),
    };
    respond("upload", &request_id, result)
}

pub async fn handle_delete(State(state): State<Arc<ProxyState>>, body: Bytes) -> Response {
    let request_id = RequestId::new();
    let result = match parse_body::<DeleteRequest>(&body) {
        Ok(request) => state.service.delete(request).await,
        Err(e) => Err(e),
    };
    respond("delete", &request_id, result)
}

pub async fn handle_defaults(State(state): State<Arc<ProxyState>>) -> Response {
    json_response(StatusCode::OK, &state.defaults)
}

// === Helpers ===

/// Parse a JSON body; an empty body reads as `{}`
fn parse_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::invalid_request(format!("Invalid JSON body: {e}")))
}

fn respond<T: Serialize>(
    operation: &str,
    request_id: &RequestId,
    result: Result<T, ApiError>,
) -> Response {
    match result {
        Ok(value) => json_response(StatusCode::OK, &value),
        Err(e) => {
            let e = e.with_request_id(request_id.as_str());
            log_error(operation, &e);
            json_response(status_of(&e), &e.to_json())
        }
    }
}

fn log_error(operation: &str, e: &ApiError) {
    if e.http_status() >= 500 {
        error!(
            operation,
            request_id = %e.request_id,
            code = e.code.as_str(),
            resource = ?e.resource,
            "{}", e.message
        );
    } else {
        warn!(
            operation,
            request_id = %e.request_id,
            code = e.code.as_str(),
            resource = ?e.resource,
            "{}", e.message
        );
    }
}

fn status_of(e: &ApiError) -> StatusCode {
    StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn json_response<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut response = Response::new(Body::from(body));
            *response.status_mut() = status;
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static("application/json"),
            );
            response
        }
        Err(e) => {
            error!(error = %e, "Failed to serialize response");
            let mut response = Response::new(Body::from(r#"{"error":"InternalError"}"#));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucketdesk_core::ErrorCode;

    #[test]
    fn test_parse_empty_body_defaults() {
        let request: ConfigRequest = parse_body(b"  ").unwrap();
        assert!(request.config.region.is_empty());
    }

    #[test]
    fn test_parse_malformed_body() {
        let err = parse_body::<ConfigRequest>(b"{not json").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequest);
        assert!(err.message.starts_with("Invalid JSON body"));
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            status_of(&ApiError::missing_configuration("region")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(&ApiError::backend("Access Denied")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
