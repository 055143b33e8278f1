use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::audit;
use crate::auth::Permission;
use crate::database::models::audit_log::AuditAction;
use crate::database::models::role::{PermissionRecord, Role, RoleDetails};
use crate::middleware::ValidatedUser;
use crate::result::{created, ok, ServiceError, ServiceResult, ValidationError, Validator};

const ROLE_COLUMNS: &str = "id, code, name, description, is_system, is_active, created_at, updated_at";

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRole {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRole {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetPermissions {
    pub permissions: Vec<String>,
}

#[async_trait]
pub trait RoleService: Send + Sync {
    async fn list(&self, actor: &ValidatedUser) -> ServiceResult<Vec<Role>>;

    async fn get(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<RoleDetails>;

    async fn create(&self, actor: &ValidatedUser, input: CreateRole) -> ServiceResult<RoleDetails>;

    async fn update(&self, actor: &ValidatedUser, id: Uuid, input: UpdateRole) -> ServiceResult<RoleDetails>;

    async fn deactivate(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<RoleDetails>;

    async fn set_permissions(
        &self,
        actor: &ValidatedUser,
        id: Uuid,
        input: SetPermissions,
    ) -> ServiceResult<RoleDetails>;
}

#[async_trait]
pub trait PermissionService: Send + Sync {
    async fn list(&self, actor: &ValidatedUser) -> ServiceResult<Vec<PermissionRecord>>;
}

pub struct PgRoleService {
    pool: PgPool,
}

impl PgRoleService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn load_role(conn: &mut PgConnection, id: Uuid) -> Result<Role, ServiceError> {
    sqlx::query_as::<_, Role>(&format!("SELECT {} FROM roles WHERE id = $1", ROLE_COLUMNS))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Role", id))
}

async fn load_details(conn: &mut PgConnection, id: Uuid) -> Result<RoleDetails, ServiceError> {
    let role = load_role(conn, id).await?;

    let permissions: Vec<String> = sqlx::query_scalar(
        "SELECT p.code FROM permissions p
         JOIN role_permissions rp ON rp.permission_id = p.id
         WHERE rp.role_id = $1
         ORDER BY p.code",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(RoleDetails { role, permissions })
}

/// Codes that are not seeded permissions
pub fn unknown_permissions(codes: &[String]) -> Vec<ValidationError> {
    codes
        .iter()
        .filter(|code| Permission::from_code(code.trim()).is_none())
        .map(|code| ValidationError::new("permissions", format!("Unknown permission '{}'", code)))
        .collect()
}

async fn replace_permissions(conn: &mut PgConnection, role_id: Uuid, codes: &[String]) -> Result<(), ServiceError> {
    let mut validator = Validator::new();
    for error in unknown_permissions(codes) {
        validator.push(error);
    }
    validator.finish()?;

    let codes: Vec<String> = codes.iter().map(|c| c.trim().to_string()).collect();

    sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
        .bind(role_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        "INSERT INTO role_permissions (role_id, permission_id)
         SELECT $1, id FROM permissions WHERE code = ANY($2)",
    )
    .bind(role_id)
    .bind(&codes)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[async_trait]
impl RoleService for PgRoleService {
    async fn list(&self, actor: &ValidatedUser) -> ServiceResult<Vec<Role>> {
        actor.require(Permission::RolesRead)?;

        let roles = sqlx::query_as::<_, Role>(&format!("SELECT {} FROM roles ORDER BY code", ROLE_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        ok(roles)
    }

    async fn get(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<RoleDetails> {
        actor.require(Permission::RolesRead)?;

        let mut conn = self.pool.acquire().await?;
        ok(load_details(&mut conn, id).await?)
    }

    async fn create(&self, actor: &ValidatedUser, input: CreateRole) -> ServiceResult<RoleDetails> {
        actor.require(Permission::RolesManage)?;

        Validator::new()
            .required("code", &input.code)
            .code("code", input.code.trim())
            .max_len("code", &input.code, 50)
            .required("name", &input.name)
            .max_len("name", &input.name, 200)
            .finish()?;

        let mut tx = self.pool.begin().await?;

        let role = sqlx::query_as::<_, Role>(&format!(
            "INSERT INTO roles (code, name, description) VALUES ($1, $2, $3) RETURNING {}",
            ROLE_COLUMNS
        ))
        .bind(input.code.trim())
        .bind(input.name.trim())
        .bind(&input.description)
        .fetch_one(&mut *tx)
        .await?;

        replace_permissions(&mut tx, role.id, &input.permissions).await?;
        audit::record(
            &mut tx,
            actor,
            "role",
            role.id,
            AuditAction::Create,
            json!({ "code": role.code, "permissions": input.permissions }),
        )
        .await?;

        let details = load_details(&mut tx, role.id).await?;
        tx.commit().await?;
        created(details)
    }

    async fn update(&self, actor: &ValidatedUser, id: Uuid, input: UpdateRole) -> ServiceResult<RoleDetails> {
        actor.require(Permission::RolesManage)?;

        if let Some(name) = &input.name {
            Validator::new().required("name", name).max_len("name", name, 200).finish()?;
        }

        let mut tx = self.pool.begin().await?;
        let role = load_role(&mut tx, id).await?;

        if role.is_system && input.is_active == Some(false) {
            return Err(ServiceError::Conflict(format!("System role '{}' cannot be deactivated", role.code)));
        }

        sqlx::query(
            "UPDATE roles SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                is_active = COALESCE($4, is_active),
                updated_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(input.name.as_deref().map(str::trim))
        .bind(&input.description)
        .bind(input.is_active)
        .execute(&mut *tx)
        .await?;

        let action = match input.is_active {
            Some(false) => AuditAction::Deactivate,
            Some(true) if !role.is_active => AuditAction::Restore,
            _ => AuditAction::Update,
        };
        audit::record(&mut tx, actor, "role", id, action, json!({ "name": input.name })).await?;

        let details = load_details(&mut tx, id).await?;
        tx.commit().await?;
        ok(details)
    }

    async fn deactivate(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<RoleDetails> {
        self.update(
            actor,
            id,
            UpdateRole {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
    }

    async fn set_permissions(
        &self,
        actor: &ValidatedUser,
        id: Uuid,
        input: SetPermissions,
    ) -> ServiceResult<RoleDetails> {
        actor.require(Permission::RolesManage)?;

        let mut tx = self.pool.begin().await?;
        let role = load_role(&mut tx, id).await?;

        if role.code == "admin" {
            return Err(ServiceError::Conflict("The admin role always holds every permission".into()));
        }

        replace_permissions(&mut tx, id, &input.permissions).await?;
        audit::record(
            &mut tx,
            actor,
            "role",
            id,
            AuditAction::Update,
            json!({ "permissions": input.permissions }),
        )
        .await?;

        let details = load_details(&mut tx, id).await?;
        tx.commit().await?;
        ok(details)
    }
}

pub struct PgPermissionService {
    pool: PgPool,
}

impl PgPermissionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionService for PgPermissionService {
    async fn list(&self, actor: &ValidatedUser) -> ServiceResult<Vec<PermissionRecord>> {
        actor.require(Permission::RolesRead)?;

        let permissions =
            sqlx::query_as::<_, PermissionRecord>("SELECT id, code, name, description FROM permissions ORDER BY code")
                .fetch_all(&self.pool)
                .await?;
        ok(permissions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_codes_are_reported_individually() {
        let codes = vec!["orders.read".to_string(), "orders.delete".to_string(), "nope".to_string()];
        let errors = unknown_permissions(&codes);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].message.contains("orders.delete"));
    }

    #[test]
    fn known_codes_pass() {
        let codes: Vec<String> = Permission::ALL.iter().map(|p| p.to_string()).collect();
        assert!(unknown_permissions(&codes).is_empty());
    }
}
