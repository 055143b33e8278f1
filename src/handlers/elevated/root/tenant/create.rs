// POST /api/root/tenant
//
// Body: {"identifier": "acme", "name": "Acme Corp", "database_name"?: "...", "connection_string"?: "..."}
//
// Without a database name or connection string the tenant gets a dedicated
// database named from its identifier (when provisioning is enabled). The
// tenant migrations run right after registration; their outcome is part of
// the response.

use axum::response::{IntoResponse, Response};

use super::tenant_service;
use crate::error::ApiError;
use crate::middleware::JsonBody;
use crate::services::tenant::CreateTenant;

pub async fn tenant_create(JsonBody(input): JsonBody<CreateTenant>) -> Result<Response, ApiError> {
    let service = tenant_service().await?;
    Ok(service.create(input).await.into_response())
}
