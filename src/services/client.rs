use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use super::audit;
use crate::auth::Permission;
use crate::database::models::audit_log::AuditAction;
use crate::database::models::client::Client;
use crate::database::{PageQuery, Paginated};
use crate::middleware::ValidatedUser;
use crate::result::{created, ok, ServiceError, ServiceResult, Validator};

const CLIENT_COLUMNS: &str = "id, code, name, contact_email, is_active, created_at, updated_at";

#[derive(Debug, Clone, Deserialize)]
pub struct CreateClient {
    pub code: String,
    pub name: String,
    pub contact_email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateClient {
    pub name: Option<String>,
    pub contact_email: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientFilter {
    #[serde(default)]
    pub include_inactive: bool,
}

#[async_trait]
pub trait ClientService: Send + Sync {
    async fn list(&self, actor: &ValidatedUser, filter: ClientFilter, page: PageQuery)
        -> ServiceResult<Paginated<Client>>;

    async fn get(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<Client>;

    async fn create(&self, actor: &ValidatedUser, input: CreateClient) -> ServiceResult<Client>;

    async fn update(&self, actor: &ValidatedUser, id: Uuid, input: UpdateClient) -> ServiceResult<Client>;

    async fn deactivate(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<Client>;
}

pub struct PgClientService {
    pool: PgPool,
}

impl PgClientService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn validate_email(validator: &mut Validator, email: Option<&str>) {
    if let Some(email) = email.map(str::trim).filter(|e| !e.is_empty()) {
        validator.email("contact_email", email);
    }
}

#[async_trait]
impl ClientService for PgClientService {
    async fn list(
        &self,
        actor: &ValidatedUser,
        filter: ClientFilter,
        page: PageQuery,
    ) -> ServiceResult<Paginated<Client>> {
        actor.require(Permission::ClientsRead)?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM clients WHERE $1 OR is_active")
            .bind(filter.include_inactive)
            .fetch_one(&self.pool)
            .await?;

        let items = sqlx::query_as::<_, Client>(&format!(
            "SELECT {} FROM clients WHERE $1 OR is_active ORDER BY code LIMIT $2 OFFSET $3",
            CLIENT_COLUMNS
        ))
        .bind(filter.include_inactive)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        ok(page.wrap(items, total))
    }

    async fn get(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<Client> {
        actor.require(Permission::ClientsRead)?;

        let client = sqlx::query_as::<_, Client>(&format!("SELECT {} FROM clients WHERE id = $1", CLIENT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Client", id))?;
        ok(client)
    }

    async fn create(&self, actor: &ValidatedUser, input: CreateClient) -> ServiceResult<Client> {
        actor.require(Permission::ClientsManage)?;

        let mut validator = Validator::new();
        validator
            .required("code", &input.code)
            .code("code", input.code.trim())
            .max_len("code", &input.code, 50)
            .required("name", &input.name)
            .max_len("name", &input.name, 200);
        validate_email(&mut validator, input.contact_email.as_deref());
        validator.finish()?;

        let mut tx = self.pool.begin().await?;

        let client = sqlx::query_as::<_, Client>(&format!(
            "INSERT INTO clients (code, name, contact_email) VALUES ($1, $2, $3) RETURNING {}",
            CLIENT_COLUMNS
        ))
        .bind(input.code.trim())
        .bind(input.name.trim())
        .bind(input.contact_email.as_deref().map(str::trim).filter(|e| !e.is_empty()))
        .fetch_one(&mut *tx)
        .await?;

        audit::record(&mut tx, actor, "client", client.id, AuditAction::Create, json!({ "code": client.code }))
            .await?;
        tx.commit().await?;

        tracing::info!("Created client {} ({})", client.code, client.id);
        created(client)
    }

    async fn update(&self, actor: &ValidatedUser, id: Uuid, input: UpdateClient) -> ServiceResult<Client> {
        actor.require(Permission::ClientsManage)?;

        let mut validator = Validator::new();
        if let Some(name) = &input.name {
            validator.required("name", name).max_len("name", name, 200);
        }
        validate_email(&mut validator, input.contact_email.as_deref());
        validator.finish()?;

        let mut tx = self.pool.begin().await?;

        let client = sqlx::query_as::<_, Client>(&format!(
            "UPDATE clients SET
                name = COALESCE($2, name),
                contact_email = COALESCE($3, contact_email),
                is_active = COALESCE($4, is_active),
                updated_at = now()
             WHERE id = $1
             RETURNING {}",
            CLIENT_COLUMNS
        ))
        .bind(id)
        .bind(input.name.as_deref().map(str::trim))
        .bind(input.contact_email.as_deref().map(str::trim))
        .bind(input.is_active)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ServiceError::not_found("Client", id))?;

        let action = match input.is_active {
            Some(false) => AuditAction::Deactivate,
            Some(true) => AuditAction::Restore,
            None => AuditAction::Update,
        };
        audit::record(&mut tx, actor, "client", id, action, json!({ "name": input.name })).await?;
        tx.commit().await?;

        ok(client)
    }

    async fn deactivate(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<Client> {
        self.update(
            actor,
            id,
            UpdateClient {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    fn acme(code: &str) -> CreateClient {
        CreateClient {
            code: code.into(),
            name: "Acme Corporation".into(),
            contact_email: None,
        }
    }

    #[sqlx::test(migrations = "./migrations/tenant")]
    async fn client_codes_are_unique(pool: PgPool) {
        let admin = fixtures::user(&pool, "admin@acme.test", &["admin"]).await;
        let clients = PgClientService::new(pool.clone());

        let first = clients.create(&admin, acme("acme")).await.unwrap();
        assert_eq!(first.status(), crate::result::ResultStatus::Created);

        let err = clients.create(&admin, acme(" acme ")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let audited: i64 = sqlx::query_scalar("SELECT count(*) FROM audit_logs WHERE entity = 'client'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(audited, 1);
    }

    #[sqlx::test(migrations = "./migrations/tenant")]
    async fn reviewers_cannot_create_clients(pool: PgPool) {
        let reviewer = fixtures::user(&pool, "reviewer@acme.test", &["reviewer"]).await;

        let err = PgClientService::new(pool).create(&reviewer, acme("acme")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }
}
