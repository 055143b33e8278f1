use axum::extract::Query;
use axum::Extension;
use uuid::Uuid;

use crate::database::models::batch::BatchSummary;
use crate::database::{PageQuery, Paginated};
use crate::middleware::{JsonBody, PathParams, TenantPool, ValidatedUser};
use crate::result::ServiceResult;
use crate::services::batch::{BatchFilter, CreateBatch, UpdateBatch};
use crate::services::{BatchService, PgBatchService};

/// GET /api/batches
pub async fn batch_list(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    Query(filter): Query<BatchFilter>,
    Query(page): Query<PageQuery>,
) -> ServiceResult<Paginated<BatchSummary>> {
    PgBatchService::new(pool).list(&user, filter, page).await
}

/// POST /api/batches
pub async fn batch_create(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    JsonBody(input): JsonBody<CreateBatch>,
) -> ServiceResult<BatchSummary> {
    PgBatchService::new(pool).create(&user, input).await
}

/// GET /api/batches/:id
pub async fn batch_show(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
) -> ServiceResult<BatchSummary> {
    PgBatchService::new(pool).get(&user, id).await
}

/// PUT /api/batches/:id
pub async fn batch_update(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
    JsonBody(input): JsonBody<UpdateBatch>,
) -> ServiceResult<BatchSummary> {
    PgBatchService::new(pool).update(&user, id, input).await
}

/// POST /api/batches/:id/close
pub async fn batch_close(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
) -> ServiceResult<BatchSummary> {
    PgBatchService::new(pool).close(&user, id).await
}
