//! HTTP router for the BucketDesk proxy

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use bucketdesk_s3::{api_router, ProxyState};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

/// Create the main application router
pub fn create_router(proxy: Arc<ProxyState>, static_dir: &Path) -> Router {
    Router::new()
        // Health check endpoint
        .route("/health", get(health_check))
        .nest("/api", api_router(proxy))
        // Browser frontend
        .fallback_service(ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "running"})))
}
