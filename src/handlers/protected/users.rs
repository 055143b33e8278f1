use axum::extract::Query;
use axum::Extension;
use uuid::Uuid;

use crate::database::models::user::{User, UserDetails};
use crate::database::{PageQuery, Paginated};
use crate::middleware::{JsonBody, PathParams, TenantPool, ValidatedUser};
use crate::result::ServiceResult;
use crate::services::user::{CreateUser, SetRoles, UpdateUser, UserFilter};
use crate::services::{PgUserService, UserService};

/// GET /api/users
pub async fn user_list(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    Query(filter): Query<UserFilter>,
    Query(page): Query<PageQuery>,
) -> ServiceResult<Paginated<User>> {
    PgUserService::new(pool).list(&user, filter, page).await
}

/// POST /api/users
pub async fn user_create(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    JsonBody(input): JsonBody<CreateUser>,
) -> ServiceResult<UserDetails> {
    PgUserService::new(pool).create(&user, input).await
}

/// GET /api/users/:id
pub async fn user_show(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
) -> ServiceResult<UserDetails> {
    PgUserService::new(pool).get(&user, id).await
}

/// PUT /api/users/:id
pub async fn user_update(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
    JsonBody(input): JsonBody<UpdateUser>,
) -> ServiceResult<UserDetails> {
    PgUserService::new(pool).update(&user, id, input).await
}

/// DELETE /api/users/:id
pub async fn user_delete(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
) -> ServiceResult<UserDetails> {
    PgUserService::new(pool).deactivate(&user, id).await
}

/// PUT /api/users/:id/roles
pub async fn user_roles(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
    JsonBody(input): JsonBody<SetRoles>,
) -> ServiceResult<UserDetails> {
    PgUserService::new(pool).set_roles(&user, id, input).await
}
