// PATCH /api/root/tenant/:tenant - name, database_name, connection_string; an empty string clears the value

use axum::response::{IntoResponse, Response};

use super::tenant_service;
use crate::error::ApiError;
use crate::middleware::{JsonBody, PathParams};
use crate::services::tenant::UpdateTenant;

pub async fn tenant_update(
    PathParams(tenant): PathParams<String>,
    JsonBody(input): JsonBody<UpdateTenant>,
) -> Result<Response, ApiError> {
    let service = tenant_service().await?;
    Ok(service.update(&tenant, input).await.into_response())
}
