use axum::extract::Query;
use axum::Extension;
use uuid::Uuid;

use crate::database::models::project::Project;
use crate::database::{PageQuery, Paginated};
use crate::middleware::{JsonBody, PathParams, TenantPool, ValidatedUser};
use crate::result::ServiceResult;
use crate::services::project::{CreateProject, ProjectFilter, UpdateProject};
use crate::services::{PgProjectService, ProjectService};

/// GET /api/projects
pub async fn project_list(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    Query(filter): Query<ProjectFilter>,
    Query(page): Query<PageQuery>,
) -> ServiceResult<Paginated<Project>> {
    PgProjectService::new(pool).list(&user, filter, page).await
}

/// POST /api/projects
pub async fn project_create(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    JsonBody(input): JsonBody<CreateProject>,
) -> ServiceResult<Project> {
    PgProjectService::new(pool).create(&user, input).await
}

/// GET /api/projects/:id
pub async fn project_show(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
) -> ServiceResult<Project> {
    PgProjectService::new(pool).get(&user, id).await
}

/// PUT /api/projects/:id
pub async fn project_update(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
    JsonBody(input): JsonBody<UpdateProject>,
) -> ServiceResult<Project> {
    PgProjectService::new(pool).update(&user, id, input).await
}

/// DELETE /api/projects/:id
pub async fn project_delete(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
) -> ServiceResult<Project> {
    PgProjectService::new(pool).deactivate(&user, id).await
}
