use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::audit;
use crate::auth::Permission;
use crate::database::models::audit_log::AuditAction;
use crate::database::models::user::{User, UserDetails};
use crate::database::{PageQuery, Paginated};
use crate::middleware::ValidatedUser;
use crate::result::{created, ok, ServiceError, ServiceResult, Validator};

const USER_COLUMNS: &str = "id, external_id, email, display_name, is_active, created_at, updated_at";

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub display_name: String,
    pub external_id: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUser {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub external_id: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetRoles {
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    pub search: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
}

#[async_trait]
pub trait UserService: Send + Sync {
    /// The caller as resolved by the middleware
    async fn me(&self, actor: &ValidatedUser) -> ServiceResult<ValidatedUser>;

    async fn list(&self, actor: &ValidatedUser, filter: UserFilter, page: PageQuery)
        -> ServiceResult<Paginated<User>>;

    async fn get(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<UserDetails>;

    async fn create(&self, actor: &ValidatedUser, input: CreateUser) -> ServiceResult<UserDetails>;

    async fn update(&self, actor: &ValidatedUser, id: Uuid, input: UpdateUser) -> ServiceResult<UserDetails>;

    async fn deactivate(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<UserDetails>;

    async fn set_roles(&self, actor: &ValidatedUser, id: Uuid, input: SetRoles) -> ServiceResult<UserDetails>;
}

pub struct PgUserService {
    pool: PgPool,
}

impl PgUserService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn details(&self, id: Uuid) -> ServiceResult<UserDetails> {
        let mut conn = self.pool.acquire().await?;
        ok(load_details(&mut conn, id).await?)
    }
}

async fn load_details(conn: &mut PgConnection, id: Uuid) -> Result<UserDetails, ServiceError> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("User", id))?;

    let roles: Vec<String> = sqlx::query_scalar(
        "SELECT r.code FROM roles r JOIN user_roles ur ON ur.role_id = r.id WHERE ur.user_id = $1 ORDER BY r.code",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(UserDetails { user, roles })
}

/// Replace a user's roles; unknown or inactive role codes are a validation error
async fn replace_roles(conn: &mut PgConnection, user_id: Uuid, codes: &[String]) -> Result<(), ServiceError> {
    let mut codes: Vec<String> = codes.iter().map(|c| c.trim().to_string()).collect();
    codes.sort();
    codes.dedup();

    let found: Vec<(Uuid, String)> =
        sqlx::query_as("SELECT id, code FROM roles WHERE code = ANY($1) AND is_active")
            .bind(&codes)
            .fetch_all(&mut *conn)
            .await?;

    let mut validator = Validator::new();
    for code in &codes {
        if !found.iter().any(|(_, c)| c == code) {
            validator.push(crate::result::ValidationError::new(
                "roles",
                format!("Unknown or inactive role '{}'", code),
            ));
        }
    }
    validator.finish()?;

    sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    let role_ids: Vec<Uuid> = found.into_iter().map(|(id, _)| id).collect();
    sqlx::query("INSERT INTO user_roles (user_id, role_id) SELECT $1, unnest($2::uuid[])")
        .bind(user_id)
        .bind(&role_ids)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

#[async_trait]
impl UserService for PgUserService {
    async fn me(&self, actor: &ValidatedUser) -> ServiceResult<ValidatedUser> {
        ok(actor.clone())
    }

    async fn list(
        &self,
        actor: &ValidatedUser,
        filter: UserFilter,
        page: PageQuery,
    ) -> ServiceResult<Paginated<User>> {
        actor.require(Permission::UsersRead)?;

        let search = filter.search.map(|s| format!("%{}%", s.trim().to_lowercase()));
        const WHERE: &str = "($1 OR is_active)
            AND ($2::text IS NULL OR lower(email) LIKE $2 OR lower(display_name) LIKE $2)";

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM users WHERE {}", WHERE))
            .bind(filter.include_inactive)
            .bind(&search)
            .fetch_one(&self.pool)
            .await?;

        let items = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE {} ORDER BY lower(email) LIMIT $3 OFFSET $4",
            USER_COLUMNS, WHERE
        ))
        .bind(filter.include_inactive)
        .bind(&search)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        ok(page.wrap(items, total))
    }

    async fn get(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<UserDetails> {
        actor.require(Permission::UsersRead)?;
        self.details(id).await
    }

    async fn create(&self, actor: &ValidatedUser, input: CreateUser) -> ServiceResult<UserDetails> {
        actor.require(Permission::UsersManage)?;

        Validator::new()
            .required("email", &input.email)
            .email("email", input.email.trim())
            .required("display_name", &input.display_name)
            .max_len("display_name", &input.display_name, 200)
            .finish()?;

        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, display_name, external_id) VALUES ($1, $2, $3) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(input.email.trim())
        .bind(input.display_name.trim())
        .bind(input.external_id.as_deref().map(str::trim).filter(|s| !s.is_empty()))
        .fetch_one(&mut *tx)
        .await?;

        replace_roles(&mut tx, user.id, &input.roles).await?;
        audit::record(
            &mut tx,
            actor,
            "user",
            user.id,
            AuditAction::Create,
            json!({ "email": user.email, "roles": input.roles }),
        )
        .await?;

        let details = load_details(&mut tx, user.id).await?;
        tx.commit().await?;

        tracing::info!("Created user {} ({})", details.user.email, details.user.id);
        created(details)
    }

    async fn update(&self, actor: &ValidatedUser, id: Uuid, input: UpdateUser) -> ServiceResult<UserDetails> {
        actor.require(Permission::UsersManage)?;

        let mut validator = Validator::new();
        if let Some(email) = &input.email {
            validator.required("email", email).email("email", email.trim());
        }
        if let Some(name) = &input.display_name {
            validator.required("display_name", name).max_len("display_name", name, 200);
        }
        validator.finish()?;

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE users SET
                email = COALESCE($2, email),
                display_name = COALESCE($3, display_name),
                external_id = COALESCE($4, external_id),
                is_active = COALESCE($5, is_active),
                updated_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(input.email.as_deref().map(str::trim))
        .bind(input.display_name.as_deref().map(str::trim))
        .bind(input.external_id.as_deref().map(str::trim))
        .bind(input.is_active)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(ServiceError::not_found("User", id));
        }

        let action = match input.is_active {
            Some(true) => AuditAction::Restore,
            Some(false) => AuditAction::Deactivate,
            None => AuditAction::Update,
        };
        audit::record(
            &mut tx,
            actor,
            "user",
            id,
            action,
            json!({ "email": input.email, "display_name": input.display_name }),
        )
        .await?;

        let details = load_details(&mut tx, id).await?;
        tx.commit().await?;
        ok(details)
    }

    async fn deactivate(&self, actor: &ValidatedUser, id: Uuid) -> ServiceResult<UserDetails> {
        actor.require(Permission::UsersManage)?;
        if actor.id == id {
            return Err(ServiceError::Conflict("You cannot deactivate your own account".into()));
        }

        self.update(
            actor,
            id,
            UpdateUser {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
    }

    async fn set_roles(&self, actor: &ValidatedUser, id: Uuid, input: SetRoles) -> ServiceResult<UserDetails> {
        actor.require(Permission::UsersManage)?;

        let mut tx = self.pool.begin().await?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(ServiceError::not_found("User", id));
        }

        replace_roles(&mut tx, id, &input.roles).await?;
        audit::record(&mut tx, actor, "user", id, AuditAction::Update, json!({ "roles": input.roles })).await?;

        let details = load_details(&mut tx, id).await?;
        tx.commit().await?;
        ok(details)
    }
}
