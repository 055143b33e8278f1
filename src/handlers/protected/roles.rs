use axum::Extension;
use uuid::Uuid;

use crate::database::models::role::{PermissionRecord, Role, RoleDetails};
use crate::middleware::{JsonBody, PathParams, TenantPool, ValidatedUser};
use crate::result::ServiceResult;
use crate::services::role::{CreateRole, SetPermissions, UpdateRole};
use crate::services::{PermissionService, PgPermissionService, PgRoleService, RoleService};

/// GET /api/roles
pub async fn role_list(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
) -> ServiceResult<Vec<Role>> {
    PgRoleService::new(pool).list(&user).await
}

/// POST /api/roles
pub async fn role_create(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    JsonBody(input): JsonBody<CreateRole>,
) -> ServiceResult<RoleDetails> {
    PgRoleService::new(pool).create(&user, input).await
}

/// GET /api/roles/:id
pub async fn role_show(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
) -> ServiceResult<RoleDetails> {
    PgRoleService::new(pool).get(&user, id).await
}

/// PUT /api/roles/:id
pub async fn role_update(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
    JsonBody(input): JsonBody<UpdateRole>,
) -> ServiceResult<RoleDetails> {
    PgRoleService::new(pool).update(&user, id, input).await
}

/// DELETE /api/roles/:id
pub async fn role_delete(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
) -> ServiceResult<RoleDetails> {
    PgRoleService::new(pool).deactivate(&user, id).await
}

/// PUT /api/roles/:id/permissions
pub async fn role_permissions(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
    JsonBody(input): JsonBody<SetPermissions>,
) -> ServiceResult<RoleDetails> {
    PgRoleService::new(pool).set_permissions(&user, id, input).await
}

/// GET /api/permissions
pub async fn permission_list(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
) -> ServiceResult<Vec<PermissionRecord>> {
    PgPermissionService::new(pool).list(&user).await
}
