use std::collections::BTreeSet;

use axum::{extract::Request, middleware::Next, response::Response};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::auth::AuthUser;
use super::validate_tenant::{TenantPool, ValidatedTenant};
use crate::auth::Permission;
use crate::database::models::user::User;
use crate::error::ApiError;
use crate::result::ServiceError;

/// Tenant user behind the request, with effective roles and permissions
#[derive(Clone, Debug, Serialize)]
pub struct ValidatedUser {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub roles: Vec<String>,
    pub permissions: BTreeSet<String>,
    pub is_root: bool,
}

impl ValidatedUser {
    /// Stand-in for a root token with no matching tenant user
    pub fn synthetic_root(sub: &str) -> Self {
        Self {
            id: Uuid::nil(),
            email: sub.to_string(),
            display_name: "Platform administrator".to_string(),
            roles: vec!["root".to_string()],
            permissions: Permission::ALL.iter().map(|p| p.as_str().to_string()).collect(),
            is_root: true,
        }
    }

    pub fn has(&self, permission: Permission) -> bool {
        self.is_root || self.permissions.contains(permission.as_str())
    }

    pub fn require(&self, permission: Permission) -> Result<(), ServiceError> {
        if self.has(permission) {
            Ok(())
        } else {
            tracing::debug!("User {} lacks permission {}", self.id, permission);
            Err(ServiceError::Forbidden(format!("Missing permission '{}'", permission)))
        }
    }
}

/// Loads the user named by the token subject from the tenant database
pub async fn validate_user_middleware(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let auth_user = request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("JWT authentication required before user validation"))?;

    let TenantPool(pool) = request
        .extensions()
        .get::<TenantPool>()
        .cloned()
        .ok_or_else(|| ApiError::internal_server_error("Tenant pool required before user validation"))?;

    let tenant = request
        .extensions()
        .get::<ValidatedTenant>()
        .map(|t| t.identifier.clone())
        .unwrap_or_default();

    let validated_user = match load_user(&pool, &auth_user.sub).await {
        Ok(Some(user)) => user,
        Ok(None) if auth_user.is_root() => {
            tracing::debug!("Root token '{}' has no user in tenant '{}'", auth_user.sub, tenant);
            ValidatedUser::synthetic_root(&auth_user.sub)
        }
        Ok(None) => {
            tracing::warn!("User validation failed: '{}' not found or inactive in tenant '{}'", auth_user.sub, tenant);
            return Err(ApiError::forbidden(format!(
                "User '{}' is not active in tenant '{}'",
                auth_user.sub, tenant
            )));
        }
        Err(e) => {
            tracing::error!("Database error validating user in tenant '{}': {}", tenant, e);
            return Err(ApiError::internal_server_error("Failed to validate user"));
        }
    };

    let validated_user = if auth_user.is_root() {
        ValidatedUser { is_root: true, ..validated_user }
    } else {
        validated_user
    };

    tracing::debug!(
        "User validation successful: {} with {} permission(s) in tenant '{}'",
        validated_user.email,
        validated_user.permissions.len(),
        tenant
    );

    request.extensions_mut().insert(validated_user);

    Ok(next.run(request).await)
}

/// Active user whose external id or email equals `sub`
pub async fn load_user(pool: &PgPool, sub: &str) -> Result<Option<ValidatedUser>, sqlx::Error> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, external_id, email, display_name, is_active, created_at, updated_at
         FROM users
         WHERE is_active AND (external_id = $1 OR lower(email) = lower($1))
         ORDER BY (external_id = $1) DESC NULLS LAST
         LIMIT 1",
    )
    .bind(sub)
    .fetch_optional(pool)
    .await?;

    let Some(user) = user else {
        return Ok(None);
    };

    let roles: Vec<String> = sqlx::query_scalar(
        "SELECT r.code FROM roles r
         JOIN user_roles ur ON ur.role_id = r.id
         WHERE ur.user_id = $1 AND r.is_active
         ORDER BY r.code",
    )
    .bind(user.id)
    .fetch_all(pool)
    .await?;

    let permissions: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT p.code FROM permissions p
         JOIN role_permissions rp ON rp.permission_id = p.id
         JOIN user_roles ur ON ur.role_id = rp.role_id
         JOIN roles r ON r.id = ur.role_id
         WHERE ur.user_id = $1 AND r.is_active",
    )
    .bind(user.id)
    .fetch_all(pool)
    .await?;

    Ok(Some(ValidatedUser {
        id: user.id,
        email: user.email,
        display_name: user.display_name,
        roles,
        permissions: permissions.into_iter().collect(),
        is_root: false,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operator() -> ValidatedUser {
        ValidatedUser {
            id: Uuid::new_v4(),
            email: "op@acme.io".into(),
            display_name: "Operator".into(),
            roles: vec!["operator".into()],
            permissions: ["orders.read", "orders.process"].iter().map(|s| s.to_string()).collect(),
            is_root: false,
        }
    }

    #[test]
    fn require_checks_permission_codes() {
        let user = operator();
        assert!(user.require(Permission::OrdersProcess).is_ok());

        let err = user.require(Permission::OrdersReview).unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(ref msg) if msg.contains("orders.review")));
    }

    #[test]
    fn synthetic_root_holds_everything() {
        let root = ValidatedUser::synthetic_root("platform");
        assert!(root.is_root);
        assert_eq!(root.permissions.len(), Permission::ALL.len());
        assert!(Permission::ALL.iter().all(|p| root.has(*p)));
    }

    #[sqlx::test(migrations = "./migrations/tenant")]
    async fn load_user_unions_active_role_permissions(pool: PgPool) {
        let user = crate::testing::fixtures::user(&pool, "Dana@Acme.test", &["reviewer", "operator"]).await;
        assert_eq!(user.roles, vec!["operator".to_string(), "reviewer".to_string()]);
        assert!(user.has(Permission::OrdersProcess));
        assert!(user.has(Permission::OrdersReview));
        assert!(!user.has(Permission::UsersManage));
        assert!(!user.is_root);

        let same = load_user(&pool, "dana@acme.TEST").await.unwrap().unwrap();
        assert_eq!(same.id, user.id);

        sqlx::query("UPDATE roles SET is_active = FALSE WHERE code = 'reviewer'")
            .execute(&pool)
            .await
            .unwrap();
        let narrowed = load_user(&pool, "dana@acme.test").await.unwrap().unwrap();
        assert_eq!(narrowed.roles, vec!["operator".to_string()]);
        assert!(!narrowed.has(Permission::OrdersReview));
        assert!(narrowed.has(Permission::OrdersProcess));

        sqlx::query("UPDATE users SET is_active = FALSE WHERE id = $1")
            .bind(user.id)
            .execute(&pool)
            .await
            .unwrap();
        assert!(load_user(&pool, "dana@acme.test").await.unwrap().is_none());
    }
}
