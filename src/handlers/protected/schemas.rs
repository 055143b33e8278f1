use axum::extract::Query;
use axum::Extension;
use uuid::Uuid;

use crate::database::models::schema::{Schema, SchemaDetails, SchemaField};
use crate::database::{PageQuery, Paginated};
use crate::middleware::{JsonBody, PathParams, TenantPool, ValidatedUser};
use crate::result::ServiceResult;
use crate::services::schema::{CreateField, CreateSchema, SchemaFilter, UpdateField, UpdateSchema};
use crate::services::{PgSchemaService, SchemaService};

/// GET /api/schemas
pub async fn schema_list(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    Query(filter): Query<SchemaFilter>,
    Query(page): Query<PageQuery>,
) -> ServiceResult<Paginated<Schema>> {
    PgSchemaService::new(pool).list(&user, filter, page).await
}

/// POST /api/schemas
pub async fn schema_create(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    JsonBody(input): JsonBody<CreateSchema>,
) -> ServiceResult<Schema> {
    PgSchemaService::new(pool).create(&user, input).await
}

/// GET /api/schemas/:id - schema with its active fields
pub async fn schema_show(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
) -> ServiceResult<SchemaDetails> {
    PgSchemaService::new(pool).get(&user, id).await
}

/// PUT /api/schemas/:id
pub async fn schema_update(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
    JsonBody(input): JsonBody<UpdateSchema>,
) -> ServiceResult<Schema> {
    PgSchemaService::new(pool).update(&user, id, input).await
}

/// DELETE /api/schemas/:id
pub async fn schema_delete(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
) -> ServiceResult<Schema> {
    PgSchemaService::new(pool).deactivate(&user, id).await
}

/// GET /api/schemas/:id/fields
pub async fn field_list(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
) -> ServiceResult<Vec<SchemaField>> {
    PgSchemaService::new(pool).list_fields(&user, id).await
}

/// POST /api/schemas/:id/fields
pub async fn field_create(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
    JsonBody(input): JsonBody<CreateField>,
) -> ServiceResult<SchemaField> {
    PgSchemaService::new(pool).add_field(&user, id, input).await
}

/// PUT /api/schemas/:id/fields/:field_id
pub async fn field_update(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams((id, field_id)): PathParams<(Uuid, Uuid)>,
    JsonBody(input): JsonBody<UpdateField>,
) -> ServiceResult<SchemaField> {
    PgSchemaService::new(pool).update_field(&user, id, field_id, input).await
}

/// DELETE /api/schemas/:id/fields/:field_id
pub async fn field_delete(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams((id, field_id)): PathParams<(Uuid, Uuid)>,
) -> ServiceResult<SchemaField> {
    PgSchemaService::new(pool).remove_field(&user, id, field_id).await
}

/// PUT /api/schemas/:id/fields/order - body is every active field id, in the new order
pub async fn field_reorder(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
    JsonBody(field_ids): JsonBody<Vec<Uuid>>,
) -> ServiceResult<Vec<SchemaField>> {
    PgSchemaService::new(pool).reorder_fields(&user, id, field_ids).await
}
