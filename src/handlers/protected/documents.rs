use axum::Extension;
use uuid::Uuid;

use crate::database::models::document::Document;
use crate::middleware::{JsonBody, PathParams, TenantPool, ValidatedUser};
use crate::result::ServiceResult;
use crate::services::document::CreateDocument;
use crate::services::{DocumentService, PgDocumentService};

/// GET /api/orders/:id/documents
pub async fn document_list(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(order_id): PathParams<Uuid>,
) -> ServiceResult<Vec<Document>> {
    PgDocumentService::new(pool).list(&user, order_id).await
}

/// POST /api/orders/:id/documents
pub async fn document_create(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(order_id): PathParams<Uuid>,
    JsonBody(input): JsonBody<CreateDocument>,
) -> ServiceResult<Document> {
    PgDocumentService::new(pool).add(&user, order_id, input).await
}

/// DELETE /api/documents/:id
pub async fn document_delete(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
) -> ServiceResult<Document> {
    PgDocumentService::new(pool).remove(&user, id).await
}
