use axum::response::{IntoResponse, Response};

use super::tenant::tenant_service;
use crate::error::ApiError;

/// POST /api/root/migrate - bring every active tenant database up to date
pub async fn migrate_all() -> Result<Response, ApiError> {
    let service = tenant_service().await?;
    Ok(service.migrate_all().await.into_response())
}
