use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::audit;
use crate::auth::Permission;
use crate::database::models::audit_log::AuditAction;
use crate::database::models::batch::BatchStatus;
use crate::database::models::order::{Order, OrderStatus};
use crate::database::{PageQuery, Paginated};
use crate::middleware::ValidatedUser;
use crate::result::{created, ok, ServiceError, ServiceResult, Validator};

pub(crate) const ORDER_COLUMNS: &str =
    "id, batch_id, schema_id, reference, status, priority, assigned_to, is_active, created_at, updated_at";

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrder {
    pub batch_id: Uuid,
    pub schema_id: Uuid,
    pub reference: String,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateOrder {
    pub reference: Option<String>,
    pub priority: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub batch_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    pub assigned_to: Option<Uuid>,
    /// Only orders assigned to the caller
    #[serde(default)]
    pub mine: bool,
}

#[async_trait]
pub trait OrderService: Send + Sync {
    async fn list(&self, actor: &ValidatedUser, filter: OrderFilter, page: PageQuery)
        -> ServiceResult<Paginated<Order>>;

    async fn get(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<Order>;

    async fn create(&self, actor: &ValidatedUser, input: CreateOrder) -> ServiceResult<Order>;

    async fn update(&self, actor: &ValidatedUser, id: Uuid, input: UpdateOrder) -> ServiceResult<Order>;

    async fn deactivate(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<Order>;
}

pub struct PgOrderService {
    pool: PgPool,
}

impl PgOrderService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Active order, optionally locked for the rest of the transaction
pub(crate) async fn load_order(conn: &mut PgConnection, id: Uuid, for_update: bool) -> Result<Order, ServiceError> {
    let sql = format!(
        "SELECT {} FROM orders WHERE id = $1 AND is_active{}",
        ORDER_COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    );

    sqlx::query_as::<_, Order>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Order", id))
}

#[async_trait]
impl OrderService for PgOrderService {
    async fn list(
        &self,
        actor: &ValidatedUser,
        filter: OrderFilter,
        page: PageQuery,
    ) -> ServiceResult<Paginated<Order>> {
        actor.require(Permission::OrdersRead)?;

        let assigned_to = if filter.mine { Some(actor.id) } else { filter.assigned_to };

        const WHERE: &str = "is_active
            AND ($1::uuid IS NULL OR batch_id = $1)
            AND ($2::order_status IS NULL OR status = $2)
            AND ($3::uuid IS NULL OR assigned_to = $3)";

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM orders WHERE {}", WHERE))
            .bind(filter.batch_id)
            .bind(filter.status)
            .bind(assigned_to)
            .fetch_one(&self.pool)
            .await?;

        let items = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE {}
             ORDER BY priority DESC, created_at
             LIMIT $4 OFFSET $5",
            ORDER_COLUMNS, WHERE
        ))
        .bind(filter.batch_id)
        .bind(filter.status)
        .bind(assigned_to)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        ok(page.wrap(items, total))
    }

    async fn get(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<Order> {
        actor.require(Permission::OrdersRead)?;

        let mut conn = self.pool.acquire().await?;
        ok(load_order(&mut conn, id, false).await?)
    }

    async fn create(&self, actor: &ValidatedUser, input: CreateOrder) -> ServiceResult<Order> {
        actor.require(Permission::OrdersManage)?;

        Validator::new()
            .required("reference", &input.reference)
            .max_len("reference", &input.reference, 100)
            .finish()?;

        let mut tx = self.pool.begin().await?;

        let batch: Option<(Uuid, BatchStatus)> =
            sqlx::query_as("SELECT project_id, status FROM batches WHERE id = $1")
                .bind(input.batch_id)
                .fetch_optional(&mut *tx)
                .await?;
        let (project_id, batch_status) =
            batch.ok_or_else(|| ServiceError::invalid("batch_id", "Batch does not exist"))?;
        if batch_status == BatchStatus::Closed {
            return Err(ServiceError::Conflict("Batch is closed; no new orders can be added".into()));
        }

        let schema_ok: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM schemas WHERE id = $1 AND project_id = $2 AND is_active)",
        )
        .bind(input.schema_id)
        .bind(project_id)
        .fetch_one(&mut *tx)
        .await?;
        if !schema_ok {
            return Err(ServiceError::invalid(
                "schema_id",
                "Schema does not exist, is not active, or belongs to another project",
            ));
        }

        let order = sqlx::query_as::<_, Order>(&format!(
            "INSERT INTO orders (batch_id, schema_id, reference, priority) VALUES ($1, $2, $3, $4) RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(input.batch_id)
        .bind(input.schema_id)
        .bind(input.reference.trim())
        .bind(input.priority)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut tx,
            actor,
            "order",
            order.id,
            AuditAction::Create,
            json!({ "batch_id": order.batch_id, "reference": order.reference }),
        )
        .await?;
        tx.commit().await?;

        created(order)
    }

    async fn update(&self, actor: &ValidatedUser, id: Uuid, input: UpdateOrder) -> ServiceResult<Order> {
        actor.require(Permission::OrdersManage)?;

        if let Some(reference) = &input.reference {
            Validator::new()
                .required("reference", reference)
                .max_len("reference", reference, 100)
                .finish()?;
        }

        let mut tx = self.pool.begin().await?;
        let current = load_order(&mut tx, id, true).await?;

        if current.status.is_final() {
            return Err(ServiceError::Conflict(format!(
                "Order is {} and can no longer be changed",
                current.status.as_str()
            )));
        }

        let order = sqlx::query_as::<_, Order>(&format!(
            "UPDATE orders SET
                reference = COALESCE($2, reference),
                priority = COALESCE($3, priority),
                updated_at = now()
             WHERE id = $1
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(id)
        .bind(input.reference.as_deref().map(str::trim))
        .bind(input.priority)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut tx,
            actor,
            "order",
            id,
            AuditAction::Update,
            json!({ "reference": input.reference, "priority": input.priority }),
        )
        .await?;
        tx.commit().await?;

        ok(order)
    }

    async fn deactivate(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<Order> {
        actor.require(Permission::OrdersManage)?;

        let mut tx = self.pool.begin().await?;
        load_order(&mut tx, id, true).await?;

        let order = sqlx::query_as::<_, Order>(&format!(
            "UPDATE orders SET is_active = false, updated_at = now() WHERE id = $1 RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(&mut tx, actor, "order", id, AuditAction::Deactivate, json!({ "reference": order.reference }))
            .await?;
        tx.commit().await?;

        ok(order)
    }
}
