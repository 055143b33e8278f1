// POST /api/root/tenant/:tenant/migrate

use axum::response::{IntoResponse, Response};

use super::tenant_service;
use crate::error::ApiError;
use crate::middleware::PathParams;

pub async fn tenant_migrate(PathParams(tenant): PathParams<String>) -> Result<Response, ApiError> {
    let service = tenant_service().await?;
    Ok(service.migrate(&tenant).await.into_response())
}
