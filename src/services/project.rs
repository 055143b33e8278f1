use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use super::audit;
use crate::auth::Permission;
use crate::database::models::audit_log::AuditAction;
use crate::database::models::project::Project;
use crate::database::{PageQuery, Paginated};
use crate::middleware::ValidatedUser;
use crate::result::{created, ok, ServiceError, ServiceResult, Validator};

const PROJECT_COLUMNS: &str = "id, client_id, code, name, description, is_active, created_at, updated_at";

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProject {
    pub client_id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProject {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectFilter {
    pub client_id: Option<Uuid>,
    #[serde(default)]
    pub include_inactive: bool,
}

#[async_trait]
pub trait ProjectService: Send + Sync {
    async fn list(
        &self,
        actor: &ValidatedUser,
        filter: ProjectFilter,
        page: PageQuery,
    ) -> ServiceResult<Paginated<Project>>;

    async fn get(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<Project>;

    async fn create(&self, actor: &ValidatedUser, input: CreateProject) -> ServiceResult<Project>;

    async fn update(&self, actor: &ValidatedUser, id: Uuid, input: UpdateProject) -> ServiceResult<Project>;

    async fn deactivate(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<Project>;
}

pub struct PgProjectService {
    pool: PgPool,
}

impl PgProjectService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectService for PgProjectService {
    async fn list(
        &self,
        actor: &ValidatedUser,
        filter: ProjectFilter,
        page: PageQuery,
    ) -> ServiceResult<Paginated<Project>> {
        actor.require(Permission::ProjectsRead)?;

        const WHERE: &str = "($1::uuid IS NULL OR client_id = $1) AND ($2 OR is_active)";

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM projects WHERE {}", WHERE))
            .bind(filter.client_id)
            .bind(filter.include_inactive)
            .fetch_one(&self.pool)
            .await?;

        let items = sqlx::query_as::<_, Project>(&format!(
            "SELECT {} FROM projects WHERE {} ORDER BY code LIMIT $3 OFFSET $4",
            PROJECT_COLUMNS, WHERE
        ))
        .bind(filter.client_id)
        .bind(filter.include_inactive)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        ok(page.wrap(items, total))
    }

    async fn get(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<Project> {
        actor.require(Permission::ProjectsRead)?;

        let project =
            sqlx::query_as::<_, Project>(&format!("SELECT {} FROM projects WHERE id = $1", PROJECT_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| ServiceError::not_found("Project", id))?;
        ok(project)
    }

    async fn create(&self, actor: &ValidatedUser, input: CreateProject) -> ServiceResult<Project> {
        actor.require(Permission::ProjectsManage)?;

        Validator::new()
            .required("code", &input.code)
            .code("code", input.code.trim())
            .max_len("code", &input.code, 50)
            .required("name", &input.name)
            .max_len("name", &input.name, 200)
            .finish()?;

        let mut tx = self.pool.begin().await?;

        let client_active: Option<bool> = sqlx::query_scalar("SELECT is_active FROM clients WHERE id = $1")
            .bind(input.client_id)
            .fetch_optional(&mut *tx)
            .await?;
        match client_active {
            None => return Err(ServiceError::invalid("client_id", "Client does not exist")),
            Some(false) => return Err(ServiceError::invalid("client_id", "Client is not active")),
            Some(true) => {}
        }

        let project = sqlx::query_as::<_, Project>(&format!(
            "INSERT INTO projects (client_id, code, name, description) VALUES ($1, $2, $3, $4) RETURNING {}",
            PROJECT_COLUMNS
        ))
        .bind(input.client_id)
        .bind(input.code.trim())
        .bind(input.name.trim())
        .bind(&input.description)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut tx,
            actor,
            "project",
            project.id,
            AuditAction::Create,
            json!({ "client_id": project.client_id, "code": project.code }),
        )
        .await?;
        tx.commit().await?;

        created(project)
    }

    async fn update(&self, actor: &ValidatedUser, id: Uuid, input: UpdateProject) -> ServiceResult<Project> {
        actor.require(Permission::ProjectsManage)?;

        if let Some(name) = &input.name {
            Validator::new().required("name", name).max_len("name", name, 200).finish()?;
        }

        let mut tx = self.pool.begin().await?;

        let project = sqlx::query_as::<_, Project>(&format!(
            "UPDATE projects SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                is_active = COALESCE($4, is_active),
                updated_at = now()
             WHERE id = $1
             RETURNING {}",
            PROJECT_COLUMNS
        ))
        .bind(id)
        .bind(input.name.as_deref().map(str::trim))
        .bind(&input.description)
        .bind(input.is_active)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ServiceError::not_found("Project", id))?;

        let action = match input.is_active {
            Some(false) => AuditAction::Deactivate,
            Some(true) => AuditAction::Restore,
            None => AuditAction::Update,
        };
        audit::record(&mut tx, actor, "project", id, action, json!({ "name": input.name })).await?;
        tx.commit().await?;

        ok(project)
    }

    async fn deactivate(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<Project> {
        self.update(
            actor,
            id,
            UpdateProject {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
    }
}
