// PUT /api/root/tenant/:tenant - reactivate a soft-deleted tenant

use axum::response::{IntoResponse, Response};

use super::tenant_service;
use crate::error::ApiError;
use crate::middleware::PathParams;

pub async fn tenant_restore(PathParams(tenant): PathParams<String>) -> Result<Response, ApiError> {
    let service = tenant_service().await?;
    Ok(service.restore(&tenant).await.into_response())
}
