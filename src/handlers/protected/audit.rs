use axum::extract::Query;
use axum::Extension;

use crate::database::models::audit_log::AuditLog;
use crate::database::{PageQuery, Paginated};
use crate::middleware::{TenantPool, ValidatedUser};
use crate::result::ServiceResult;
use crate::services::audit::AuditFilter;
use crate::services::{AuditService, PgAuditService};

/// GET /api/audit
pub async fn audit_list(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    Query(filter): Query<AuditFilter>,
    Query(page): Query<PageQuery>,
) -> ServiceResult<Paginated<AuditLog>> {
    PgAuditService::new(pool).list(&user, filter, page).await
}
