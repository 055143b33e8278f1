//! POST /auth/login - development token issuance.
//!
//! Real deployments take tokens from the identity provider. With
//! `security.allow_dev_login` enabled, this endpoint mints one for any active
//! user of an active tenant, identified by email alone.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::auth::{generate_jwt, Claims};
use crate::config::config;
use crate::database::DatabaseManager;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, JsonBody};
use crate::tenancy::{PgTenantStore, TenantStore};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub tenant: String,
    pub email: String,
}

#[derive(Debug, Serialize, FromRow)]
pub struct LoginUser {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    #[serde(skip)]
    pub external_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: u64,
    pub tenant: String,
    pub user: LoginUser,
}

pub async fn login(JsonBody(body): JsonBody<LoginRequest>) -> Result<ApiResponse<LoginResponse>, ApiError> {
    let settings = config();
    if !settings.security.allow_dev_login {
        return Err(ApiError::forbidden("Development login is disabled"));
    }

    if body.tenant.trim().is_empty() || body.email.trim().is_empty() {
        return Err(ApiError::bad_request("Both 'tenant' and 'email' are required"));
    }

    let store = PgTenantStore::new(DatabaseManager::iam_pool().await?);
    let tenant = store
        .try_get(&body.tenant)
        .await
        .ok_or_else(|| ApiError::not_found(format!("Tenant '{}' not found", body.tenant.trim())))?;
    if !tenant.is_active {
        return Err(ApiError::forbidden(format!("Tenant '{}' is not active", tenant.identifier)));
    }

    let pool = DatabaseManager::tenant_pool(&tenant).await?;
    let user = sqlx::query_as::<_, LoginUser>(
        "SELECT id, email, display_name, external_id FROM users WHERE lower(email) = lower($1) AND is_active",
    )
    .bind(body.email.trim())
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Login lookup failed for tenant '{}': {}", tenant.identifier, e);
        ApiError::internal_server_error("Login failed")
    })?
    .ok_or_else(|| ApiError::unauthorized("Unknown or inactive user"))?;

    let subject = user.external_id.clone().unwrap_or_else(|| user.email.clone());
    let claims = Claims::new(subject, Some(tenant.identifier.clone()), None);
    let token = generate_jwt(&claims).map_err(|e| {
        tracing::error!("Failed to sign token: {}", e);
        ApiError::internal_server_error("Failed to issue token")
    })?;

    tracing::info!("Development login for {} in tenant '{}'", user.email, tenant.identifier);

    Ok(ApiResponse::success(LoginResponse {
        token,
        expires_in: settings.security.jwt_expiry_hours * 3600,
        tenant: tenant.identifier,
        user,
    }))
}
