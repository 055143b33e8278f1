// GET /api/root/tenant/:tenant/health

use axum::response::{IntoResponse, Response};

use super::tenant_service;
use crate::error::ApiError;
use crate::middleware::PathParams;

pub async fn tenant_health(PathParams(tenant): PathParams<String>) -> Result<Response, ApiError> {
    let service = tenant_service().await?;
    Ok(service.health(&tenant).await.into_response())
}
