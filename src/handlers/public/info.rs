use axum::response::IntoResponse;
use serde_json::json;

use crate::config::config;
use crate::database::DatabaseManager;
use crate::error::ApiError;
use crate::middleware::ApiResponse;

/// GET / - service name, version and route overview
pub async fn root() -> impl IntoResponse {
    ApiResponse::success(json!({
        "name": "DocFlow API",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": format!("{:?}", config().environment).to_lowercase(),
        "endpoints": {
            "health": "/health (public)",
            "login": "/auth/login (public, development only)",
            "api": "/api/* (bearer token + tenant)",
            "root": "/api/root/* (root token)"
        }
    }))
}

/// GET /health - 200 while the IAM database answers, 503 otherwise
pub async fn health() -> Result<ApiResponse<serde_json::Value>, ApiError> {
    match DatabaseManager::health_check().await {
        Ok(()) => Ok(ApiResponse::success(json!({
            "status": "ok",
            "database": "up",
            "version": env!("CARGO_PKG_VERSION"),
        }))),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            Err(ApiError::service_unavailable("Database unavailable"))
        }
    }
}
