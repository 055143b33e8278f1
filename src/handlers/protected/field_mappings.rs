use axum::extract::Query;
use axum::Extension;
use uuid::Uuid;

use crate::database::models::schema::FieldMapping;
use crate::middleware::{JsonBody, PathParams, TenantPool, ValidatedUser};
use crate::result::ServiceResult;
use crate::services::field_mapping::{CreateFieldMapping, FieldMappingFilter};
use crate::services::{FieldMappingService, PgFieldMappingService};

/// GET /api/field-mappings
pub async fn mapping_list(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    Query(filter): Query<FieldMappingFilter>,
) -> ServiceResult<Vec<FieldMapping>> {
    PgFieldMappingService::new(pool).list(&user, filter).await
}

/// POST /api/field-mappings
pub async fn mapping_create(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    JsonBody(input): JsonBody<CreateFieldMapping>,
) -> ServiceResult<FieldMapping> {
    PgFieldMappingService::new(pool).create(&user, input).await
}

/// DELETE /api/field-mappings/:id
pub async fn mapping_delete(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
) -> ServiceResult<FieldMapping> {
    PgFieldMappingService::new(pool).remove(&user, id).await
}
