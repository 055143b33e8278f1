use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::auth::Permission;
use crate::database::models::audit_log::{AuditAction, AuditLog};
use crate::database::{PageQuery, Paginated};
use crate::middleware::ValidatedUser;
use crate::result::{ok, ServiceResult};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
    pub entity: Option<String>,
    pub entity_id: Option<Uuid>,
    pub actor: Option<Uuid>,
}

#[async_trait]
pub trait AuditService: Send + Sync {
    async fn list(
        &self,
        actor: &ValidatedUser,
        filter: AuditFilter,
        page: PageQuery,
    ) -> ServiceResult<Paginated<AuditLog>>;
}

pub struct PgAuditService {
    pool: PgPool,
}

impl PgAuditService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditService for PgAuditService {
    async fn list(
        &self,
        actor: &ValidatedUser,
        filter: AuditFilter,
        page: PageQuery,
    ) -> ServiceResult<Paginated<AuditLog>> {
        actor.require(Permission::AuditRead)?;

        const WHERE: &str = "($1::text IS NULL OR entity = $1)
            AND ($2::uuid IS NULL OR entity_id = $2)
            AND ($3::uuid IS NULL OR actor = $3)";

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM audit_logs WHERE {}", WHERE))
            .bind(&filter.entity)
            .bind(filter.entity_id)
            .bind(filter.actor)
            .fetch_one(&self.pool)
            .await?;

        let items = sqlx::query_as::<_, AuditLog>(&format!(
            "SELECT id, actor, entity, entity_id, action, details, created_at
             FROM audit_logs WHERE {}
             ORDER BY created_at DESC
             LIMIT $4 OFFSET $5",
            WHERE
        ))
        .bind(&filter.entity)
        .bind(filter.entity_id)
        .bind(filter.actor)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        ok(page.wrap(items, total))
    }
}

/// Append an audit entry on the caller's connection, usually inside its transaction
pub async fn record(
    conn: &mut PgConnection,
    actor: &ValidatedUser,
    entity: &str,
    entity_id: Uuid,
    action: AuditAction,
    details: Value,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO audit_logs (actor, entity, entity_id, action, details) VALUES ($1, $2, $3, $4, $5)")
        .bind(actor.id)
        .bind(entity)
        .bind(entity_id)
        .bind(action)
        .bind(details)
        .execute(conn)
        .await?;

    tracing::debug!("Audit: {:?} {} {} by {}", action, entity, entity_id, actor.id);
    Ok(())
}
