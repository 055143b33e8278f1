// DELETE /api/root/tenant/:tenant - soft delete; the database is kept

use axum::response::{IntoResponse, Response};

use super::tenant_service;
use crate::error::ApiError;
use crate::middleware::PathParams;

pub async fn tenant_delete(PathParams(tenant): PathParams<String>) -> Result<Response, ApiError> {
    let service = tenant_service().await?;
    Ok(service.remove(&tenant).await.into_response())
}
