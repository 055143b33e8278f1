use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::audit;
use crate::auth::Permission;
use crate::database::models::audit_log::AuditAction;
use crate::database::models::batch::{BatchStatus, BatchSummary};
use crate::database::{PageQuery, Paginated};
use crate::middleware::ValidatedUser;
use crate::result::{created, ok, ServiceError, ServiceResult, Validator};

/// Batch columns plus order counts; open means not yet approved or cancelled
const SUMMARY_SELECT: &str = "SELECT b.id, b.project_id, b.code, b.name, b.status, b.due_date, b.created_at, b.updated_at,
        COUNT(o.id) AS order_count,
        COUNT(o.id) FILTER (WHERE o.status NOT IN ('approved', 'cancelled')) AS open_order_count
     FROM batches b
     LEFT JOIN orders o ON o.batch_id = b.id AND o.is_active";

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBatch {
    pub project_id: Uuid,
    pub code: String,
    pub name: String,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateBatch {
    pub name: Option<String>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchFilter {
    pub project_id: Option<Uuid>,
    pub status: Option<BatchStatus>,
}

#[async_trait]
pub trait BatchService: Send + Sync {
    async fn list(&self, actor: &ValidatedUser, filter: BatchFilter, page: PageQuery)
        -> ServiceResult<Paginated<BatchSummary>>;

    async fn get(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<BatchSummary>;

    async fn create(&self, actor: &ValidatedUser, input: CreateBatch) -> ServiceResult<BatchSummary>;

    async fn update(&self, actor: &ValidatedUser, id: Uuid, input: UpdateBatch) -> ServiceResult<BatchSummary>;

    /// No new orders once closed
    async fn close(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<BatchSummary>;
}

pub struct PgBatchService {
    pool: PgPool,
}

impl PgBatchService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn load_summary(conn: &mut PgConnection, id: Uuid) -> Result<BatchSummary, ServiceError> {
    sqlx::query_as::<_, BatchSummary>(&format!("{} WHERE b.id = $1 GROUP BY b.id", SUMMARY_SELECT))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Batch", id))
}

#[async_trait]
impl BatchService for PgBatchService {
    async fn list(
        &self,
        actor: &ValidatedUser,
        filter: BatchFilter,
        page: PageQuery,
    ) -> ServiceResult<Paginated<BatchSummary>> {
        actor.require(Permission::BatchesRead)?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM batches
             WHERE ($1::uuid IS NULL OR project_id = $1) AND ($2::batch_status IS NULL OR status = $2)",
        )
        .bind(filter.project_id)
        .bind(filter.status)
        .fetch_one(&self.pool)
        .await?;

        let items = sqlx::query_as::<_, BatchSummary>(&format!(
            "{} WHERE ($1::uuid IS NULL OR b.project_id = $1) AND ($2::batch_status IS NULL OR b.status = $2)
             GROUP BY b.id
             ORDER BY b.created_at DESC
             LIMIT $3 OFFSET $4",
            SUMMARY_SELECT
        ))
        .bind(filter.project_id)
        .bind(filter.status)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        ok(page.wrap(items, total))
    }

    async fn get(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<BatchSummary> {
        actor.require(Permission::BatchesRead)?;

        let mut conn = self.pool.acquire().await?;
        ok(load_summary(&mut conn, id).await?)
    }

    async fn create(&self, actor: &ValidatedUser, input: CreateBatch) -> ServiceResult<BatchSummary> {
        actor.require(Permission::BatchesManage)?;

        Validator::new()
            .required("code", &input.code)
            .code("code", input.code.trim())
            .max_len("code", &input.code, 50)
            .required("name", &input.name)
            .max_len("name", &input.name, 200)
            .finish()?;

        let mut tx = self.pool.begin().await?;

        let project_active: Option<bool> = sqlx::query_scalar("SELECT is_active FROM projects WHERE id = $1")
            .bind(input.project_id)
            .fetch_optional(&mut *tx)
            .await?;
        if project_active != Some(true) {
            return Err(ServiceError::invalid("project_id", "Project does not exist or is not active"));
        }

        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO batches (project_id, code, name, due_date) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(input.project_id)
        .bind(input.code.trim())
        .bind(input.name.trim())
        .bind(input.due_date)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut tx,
            actor,
            "batch",
            id,
            AuditAction::Create,
            json!({ "project_id": input.project_id, "code": input.code.trim() }),
        )
        .await?;

        let summary = load_summary(&mut tx, id).await?;
        tx.commit().await?;
        created(summary)
    }

    async fn update(&self, actor: &ValidatedUser, id: Uuid, input: UpdateBatch) -> ServiceResult<BatchSummary> {
        actor.require(Permission::BatchesManage)?;

        if let Some(name) = &input.name {
            Validator::new().required("name", name).max_len("name", name, 200).finish()?;
        }

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE batches SET
                name = COALESCE($2, name),
                due_date = COALESCE($3, due_date),
                updated_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(input.name.as_deref().map(str::trim))
        .bind(input.due_date)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(ServiceError::not_found("Batch", id));
        }

        audit::record(
            &mut tx,
            actor,
            "batch",
            id,
            AuditAction::Update,
            json!({ "name": input.name, "due_date": input.due_date }),
        )
        .await?;

        let summary = load_summary(&mut tx, id).await?;
        tx.commit().await?;
        ok(summary)
    }

    async fn close(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<BatchSummary> {
        actor.require(Permission::BatchesManage)?;

        let mut tx = self.pool.begin().await?;
        let current = load_summary(&mut tx, id).await?;

        if current.batch.status == BatchStatus::Closed {
            return Err(ServiceError::Conflict(format!("Batch '{}' is already closed", current.batch.code)));
        }

        sqlx::query("UPDATE batches SET status = 'closed', updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        audit::record(
            &mut tx,
            actor,
            "batch",
            id,
            AuditAction::Transition,
            json!({ "from": "open", "to": "closed", "open_orders": current.open_order_count }),
        )
        .await?;

        let summary = load_summary(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!("Closed batch {} with {} open order(s)", summary.batch.code, summary.open_order_count);
        ok(summary)
    }
}
