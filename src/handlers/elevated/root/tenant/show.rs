// GET /api/root/tenant/:tenant

use axum::response::{IntoResponse, Response};

use super::tenant_service;
use crate::error::ApiError;
use crate::middleware::PathParams;

pub async fn tenant_show(PathParams(tenant): PathParams<String>) -> Result<Response, ApiError> {
    let service = tenant_service().await?;
    Ok(service.get(&tenant).await.into_response())
}
