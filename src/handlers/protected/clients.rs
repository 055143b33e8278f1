use axum::extract::Query;
use axum::Extension;
use uuid::Uuid;

use crate::database::models::client::Client;
use crate::database::{PageQuery, Paginated};
use crate::middleware::{JsonBody, PathParams, TenantPool, ValidatedUser};
use crate::result::ServiceResult;
use crate::services::client::{ClientFilter, CreateClient, UpdateClient};
use crate::services::{ClientService, PgClientService};

/// GET /api/clients
pub async fn client_list(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    Query(filter): Query<ClientFilter>,
    Query(page): Query<PageQuery>,
) -> ServiceResult<Paginated<Client>> {
    PgClientService::new(pool).list(&user, filter, page).await
}

/// POST /api/clients
pub async fn client_create(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    JsonBody(input): JsonBody<CreateClient>,
) -> ServiceResult<Client> {
    PgClientService::new(pool).create(&user, input).await
}

/// GET /api/clients/:id
pub async fn client_show(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
) -> ServiceResult<Client> {
    PgClientService::new(pool).get(&user, id).await
}

/// PUT /api/clients/:id
pub async fn client_update(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
    JsonBody(input): JsonBody<UpdateClient>,
) -> ServiceResult<Client> {
    PgClientService::new(pool).update(&user, id, input).await
}

/// DELETE /api/clients/:id
pub async fn client_delete(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
) -> ServiceResult<Client> {
    PgClientService::new(pool).deactivate(&user, id).await
}
