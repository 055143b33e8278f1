// GET /api/root/tenant?include_inactive=true&include_health=true

use axum::extract::Query;
use axum::response::{IntoResponse, Response};

use super::tenant_service;
use crate::error::ApiError;
use crate::services::tenant::TenantListQuery;

pub async fn tenant_list(Query(query): Query<TenantListQuery>) -> Result<Response, ApiError> {
    let service = tenant_service().await?;
    Ok(service.list(query).await.into_response())
}
