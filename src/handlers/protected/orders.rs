use axum::body::Bytes;
use axum::extract::Query;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use uuid::Uuid;

use crate::database::models::order::{FlowAction, Order, OrderFieldValue, OrderFlowEvent};
use crate::database::{PageQuery, Paginated};
use crate::error::ApiError;
use crate::middleware::{JsonBody, PathParams, TenantPool, ValidatedUser};
use crate::result::ServiceResult;
use crate::services::order::{CreateOrder, OrderFilter, UpdateOrder};
use crate::services::order_data::{ExtractedImport, OrderValues};
use crate::services::order_flow::FlowRequest;
use crate::services::{
    OrderDataService, OrderFlowService, OrderService, PgOrderDataService, PgOrderFlowService, PgOrderService,
};

/// GET /api/orders
pub async fn order_list(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    Query(filter): Query<OrderFilter>,
    Query(page): Query<PageQuery>,
) -> ServiceResult<Paginated<Order>> {
    PgOrderService::new(pool).list(&user, filter, page).await
}

/// POST /api/orders
pub async fn order_create(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    JsonBody(input): JsonBody<CreateOrder>,
) -> ServiceResult<Order> {
    PgOrderService::new(pool).create(&user, input).await
}

/// GET /api/orders/:id
pub async fn order_show(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
) -> ServiceResult<Order> {
    PgOrderService::new(pool).get(&user, id).await
}

/// PUT /api/orders/:id
pub async fn order_update(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
    JsonBody(input): JsonBody<UpdateOrder>,
) -> ServiceResult<Order> {
    PgOrderService::new(pool).update(&user, id, input).await
}

/// DELETE /api/orders/:id
pub async fn order_delete(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
) -> ServiceResult<Order> {
    PgOrderService::new(pool).deactivate(&user, id).await
}

/// GET /api/orders/:id/flow
pub async fn flow_history(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
) -> ServiceResult<Vec<OrderFlowEvent>> {
    PgOrderFlowService::new(pool).history(&user, id).await
}

/// Empty body means no options; `start`, `submit`, `approve` and `cancel` usually send none.
pub fn parse_flow_request(body: &[u8]) -> Result<FlowRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(FlowRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::invalid_json(format!("Invalid JSON body: {}", e)))
}

/// POST /api/orders/:id/flow/:action
pub async fn flow_transition(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams((id, action)): PathParams<(Uuid, FlowAction)>,
    body: Bytes,
) -> Response {
    let request = match parse_flow_request(&body) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };

    PgOrderFlowService::new(pool)
        .transition(&user, id, action, request)
        .await
        .into_response()
}

/// GET /api/orders/:id/data
pub async fn data_show(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
) -> ServiceResult<Vec<OrderFieldValue>> {
    PgOrderDataService::new(pool).get(&user, id).await
}

/// PUT /api/orders/:id/data
pub async fn data_update(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
    JsonBody(input): JsonBody<OrderValues>,
) -> ServiceResult<Vec<OrderFieldValue>> {
    PgOrderDataService::new(pool).update(&user, id, input).await
}

/// POST /api/orders/:id/data/extracted - values keyed by extraction source key
pub async fn data_import(
    Extension(TenantPool(pool)): Extension<TenantPool>,
    Extension(user): Extension<ValidatedUser>,
    PathParams(id): PathParams<Uuid>,
    JsonBody(input): JsonBody<OrderValues>,
) -> ServiceResult<ExtractedImport> {
    PgOrderDataService::new(pool).import_extracted(&user, id, input).await
}
